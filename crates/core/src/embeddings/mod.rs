//! Text embedding backends shared by the collection implementations.

mod ngram;
mod openai;

pub use ngram::{CharacterNgramEmbedder, NGRAM_MODEL};
pub use openai::{OpenAiEmbedder, DEFAULT_EMBEDDING_MODEL};

use crate::error::SearchError;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Names the vector space. Vectors from different models never share a collection.
    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Which embedder a collection is built with. The dimension count comes from
/// the collection itself once it exists.
#[derive(Clone, Default)]
pub enum EmbedderConfig {
    #[default]
    CharacterNgram,
    OpenAi {
        api_key: String,
        api_base: String,
        model: String,
    },
}

impl EmbedderConfig {
    pub fn model(&self) -> &str {
        match self {
            Self::CharacterNgram => NGRAM_MODEL,
            Self::OpenAi { model, .. } => model,
        }
    }

    pub fn build(&self, dimensions: usize) -> Result<Arc<dyn Embedder>, SearchError> {
        let embedder: Arc<dyn Embedder> = match self {
            Self::CharacterNgram => Arc::new(CharacterNgramEmbedder::new(dimensions)),
            Self::OpenAi {
                api_key,
                api_base,
                model,
            } => Arc::new(OpenAiEmbedder::new(
                api_key.clone(),
                api_base,
                model.clone(),
                dimensions,
            )?),
        };
        Ok(embedder)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::DEFAULT_API_BASE;

    fn openai(api_key: &str) -> EmbedderConfig {
        EmbedderConfig::OpenAi {
            api_key: api_key.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    #[test]
    fn config_names_its_model() {
        assert_eq!(EmbedderConfig::default().model(), NGRAM_MODEL);
        assert_eq!(
            openai("sk-test").model(),
            "text-embedding-3-small"
        );
    }

    #[test]
    fn built_embedder_uses_requested_dimensions() -> Result<(), SearchError> {
        let ngram = EmbedderConfig::CharacterNgram.build(128)?;
        assert_eq!(ngram.dimensions(), 128);

        let remote = openai("sk-test").build(256)?;
        assert_eq!(remote.dimensions(), 256);
        assert_eq!(remote.model(), DEFAULT_EMBEDDING_MODEL);
        Ok(())
    }

    #[test]
    fn openai_config_without_key_fails_to_build() {
        let result = openai(" ").build(384);
        assert!(matches!(result, Err(SearchError::Embedding(_))));
    }

    #[test]
    fn orthogonal_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < f32::EPSILON);
    }
}
