use crate::embeddings::{Embedder, EmbedderConfig};
use crate::models::{ChunkMetadata, CollectionEntry, SearchHit};
use crate::store::VectorCollection;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// A collection on a Qdrant server. Point ids are the chunk sequence numbers;
/// the string entry id travels in the payload.
pub struct QdrantCollection {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: Arc<dyn Embedder>,
}

impl QdrantCollection {
    fn connect(endpoint: &str, collection: &str, client: Client, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            client,
            embedder,
        }
    }

    /// Opens the collection if it exists, keeping its vector size, or creates
    /// it with `dimensions`.
    pub async fn open_or_create(
        endpoint: &str,
        collection: &str,
        embedder: &EmbedderConfig,
        dimensions: usize,
    ) -> Result<Self, SearchError> {
        let client = Client::new();
        match fetch_collection(&client, &collection_url(endpoint, collection)).await? {
            Some(info) => {
                let stored = vector_size(&info)?;
                if stored != dimensions {
                    warn!(
                        collection,
                        stored,
                        requested = dimensions,
                        "keeping stored vector size"
                    );
                }
                Ok(Self::connect(endpoint, collection, client, embedder.build(stored)?))
            }
            None => {
                let store = Self::connect(endpoint, collection, client, embedder.build(dimensions)?);
                store.create().await?;
                Ok(store)
            }
        }
    }

    /// Opens a collection written by an earlier ingest. The embedder is sized
    /// from `config.params.vectors.size`.
    pub async fn open_existing(
        endpoint: &str,
        collection: &str,
        embedder: &EmbedderConfig,
    ) -> Result<Self, SearchError> {
        let client = Client::new();
        let info = fetch_collection(&client, &collection_url(endpoint, collection))
            .await?
            .ok_or_else(|| SearchError::CollectionMissing(collection.to_string()))?;
        let dimensions = vector_size(&info)?;
        Ok(Self::connect(endpoint, collection, client, embedder.build(dimensions)?))
    }

    fn collection_url(&self) -> String {
        collection_url(&self.endpoint, &self.collection)
    }

    async fn create(&self) -> Result<(), SearchError> {
        info!(collection = %self.collection, size = self.embedder.dimensions(), "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

fn collection_url(endpoint: &str, collection: &str) -> String {
    format!("{}/collections/{}", endpoint.trim_end_matches('/'), collection)
}

/// `GET /collections/{name}`; `None` when the server answers 404.
async fn fetch_collection(client: &Client, url: &str) -> Result<Option<Value>, SearchError> {
    let response = client.get(url).send().await?;
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => Ok(Some(response.json().await?)),
        status => Err(backend_error(status)),
    }
}

fn vector_size(info: &Value) -> Result<usize, SearchError> {
    info.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "collection info without a single unnamed vector size".to_string(),
        })
}

fn backend_error(status: StatusCode) -> SearchError {
    SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

pub(crate) fn hit_from_point(point: &Value) -> Result<SearchHit, SearchError> {
    let payload = point
        .pointer("/payload")
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search hit without payload".to_string(),
        })?;

    let metadata: ChunkMetadata = serde_json::from_value(
        payload.get("metadata").cloned().unwrap_or(Value::Null),
    )?;

    Ok(SearchHit {
        id: payload
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        text: payload
            .get("document")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        metadata,
        score: point.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
    })
}

#[async_trait]
impl VectorCollection for QdrantCollection {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&mut self, entries: &[CollectionEntry]) -> Result<(), SearchError> {
        if entries.is_empty() {
            return Ok(());
        }

        let documents = entries
            .iter()
            .map(|entry| entry.document.as_str())
            .collect::<Vec<_>>();
        let vectors = self.embedder.embed_batch(&documents).await?;

        let points = entries
            .iter()
            .zip(vectors)
            .map(|(entry, vector)| {
                json!({
                    "id": entry.metadata.chunk_id,
                    "vector": vector,
                    "payload": {
                        "id": entry.id,
                        "document": entry.document,
                        "metadata": entry.metadata,
                    },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn query(&self, text: &str, n_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self.embedder.embed(text).await?;
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": vector,
                "limit": n_results,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|points| points.iter().map(hit_from_point).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn count(&self) -> Result<usize, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response without result.count".to_string(),
            })
    }

    async fn clear(&mut self) -> Result<(), SearchError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }
        self.create().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::PageSource;

    #[test]
    fn search_point_converts_to_hit() -> Result<(), SearchError> {
        let point = json!({
            "id": 4,
            "score": 0.75,
            "payload": {
                "id": "policy_chunk_4",
                "document": "Net debt will fall",
                "metadata": {
                    "page": 1,
                    "actual_page": 9,
                    "page_source": "extracted_from_footer",
                    "chunk_id": 4,
                    "document_type": "financial_policy",
                    "source": "policy.pdf"
                }
            }
        });

        let hit = hit_from_point(&point)?;
        assert_eq!(hit.id, "policy_chunk_4");
        assert_eq!(hit.text, "Net debt will fall");
        assert_eq!(hit.metadata.actual_page, Some(9));
        assert_eq!(hit.metadata.page_source, Some(PageSource::ExtractedFromFooter));
        assert!((hit.score - 0.75).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn point_without_payload_is_rejected() {
        assert!(hit_from_point(&json!({ "id": 1, "score": 0.1 })).is_err());
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let store = QdrantCollection::connect(
            "http://localhost:6333/",
            "financial_policy",
            Client::new(),
            Arc::new(CharacterNgramEmbedder::new(16)),
        );
        assert_eq!(
            store.collection_url(),
            "http://localhost:6333/collections/financial_policy"
        );
    }

    #[test]
    fn vector_size_comes_from_collection_info() -> Result<(), SearchError> {
        let info = json!({
            "result": {
                "status": "green",
                "points_count": 212,
                "config": {
                    "params": {
                        "vectors": { "size": 256, "distance": "Cosine" },
                        "shard_number": 1
                    }
                }
            },
            "status": "ok",
            "time": 0.0001
        });
        assert_eq!(vector_size(&info)?, 256);

        let embedder = EmbedderConfig::CharacterNgram.build(vector_size(&info)?)?;
        assert_eq!(embedder.dimensions(), 256);
        Ok(())
    }

    #[test]
    fn named_vectors_are_not_supported() {
        let info = json!({
            "result": { "config": { "params": { "vectors": {
                "text": { "size": 384, "distance": "Cosine" }
            } } } }
        });
        assert!(matches!(
            vector_size(&info),
            Err(SearchError::BackendResponse { .. })
        ));
    }
}
