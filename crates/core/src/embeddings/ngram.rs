use super::{Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::SearchError;
use async_trait::async_trait;

pub const NGRAM_MODEL: &str = "char-trigram-fnv";

/// Hashes lowercase character trigrams into a fixed number of buckets and
/// L2-normalizes the result. Works offline; ingest and chat agree as long as
/// they use the same dimension count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            let mut buffer = [0u8; 4];
            for ch in window {
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        NGRAM_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.vector("Net debt to revenue ratio");
        let second = embedder.vector("Net  debt to\nrevenue ratio");
        assert_eq!(first, second);
        assert_eq!(first.len(), DEFAULT_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = CharacterNgramEmbedder::new(256);
        let query = embedder.vector("infrastructure investment");
        let close = embedder.vector("Investment in infrastructure will rise");
        let far = embedder.vector("Superannuation liabilities");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let vector = CharacterNgramEmbedder::new(8).vector("");
        assert!(vector.iter().all(|value| *value == 0.0));
        assert_eq!(cosine_similarity(&vector, &vector), 0.0);
    }

    #[tokio::test]
    async fn batch_keeps_input_order() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder::new(32);
        let vectors = embedder.embed_batch(&["capital works", "net debt"]).await?;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.vector("net debt"));
        assert_eq!(embedder.embed("capital works").await?, vectors[0]);
        Ok(())
    }
}
