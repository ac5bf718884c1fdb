use super::Embedder;
use crate::completion::endpoint_url;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const MAX_BATCH_INPUTS: usize = 128;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint. The
/// `dimensions` request field shortens `text-embedding-3-*` vectors to the
/// collection's size.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        api_base: &str,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Embedding(
                "API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(api_base, "embeddings")?,
            api_key,
            model: model.into(),
            dimensions: dimensions.max(1),
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimensions,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "openai-embeddings".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        vectors_in_order(response.json().await?, texts.len(), self.dimensions)
    }
}

/// Orders vectors by their response index and checks count and width.
fn vectors_in_order(
    response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, SearchError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(SearchError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);
    if let Some(item) = data.iter().find(|item| item.embedding.len() != dimensions) {
        return Err(SearchError::Embedding(format!(
            "embedding {} has {} dimensions, collection expects {dimensions}",
            item.index,
            item.embedding.len()
        )));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_INPUTS) {
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_model_and_dimensions() -> Result<(), serde_json::Error> {
        let input = ["net debt", "capital works"];
        let value = serde_json::to_value(EmbeddingRequest {
            model: DEFAULT_EMBEDDING_MODEL,
            input: &input,
            dimensions: 384,
        })?;
        assert_eq!(value["model"], "text-embedding-3-small");
        assert_eq!(value["input"][1], "capital works");
        assert_eq!(value["dimensions"], 384);
        Ok(())
    }

    #[test]
    fn response_is_reordered_by_index() -> Result<(), Box<dyn std::error::Error>> {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[
                {"object":"embedding","index":1,"embedding":[0.0,1.0]},
                {"object":"embedding","index":0,"embedding":[1.0,0.0]}
            ],"model":"text-embedding-3-small"}"#,
        )?;
        let vectors = vectors_in_order(response, 2, 2)?;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn short_or_narrow_responses_are_rejected() -> Result<(), serde_json::Error> {
        let missing: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0,0.0]}]}"#)?;
        assert!(matches!(
            vectors_in_order(missing, 2, 2),
            Err(SearchError::Embedding(_))
        ));

        let narrow: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#)?;
        assert!(matches!(
            vectors_in_order(narrow, 1, 2),
            Err(SearchError::Embedding(_))
        ));
        Ok(())
    }

    #[test]
    fn endpoint_follows_api_base() -> Result<(), SearchError> {
        let embedder = OpenAiEmbedder::new("sk-test", "http://localhost:8080/v1", "local", 8)?;
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:8080/v1/embeddings");
        Ok(())
    }
}
