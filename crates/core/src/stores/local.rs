use crate::embeddings::{cosine_similarity, Embedder, EmbedderConfig};
use crate::models::{ChunkMetadata, CollectionEntry, SearchHit};
use crate::store::VectorCollection;
use crate::SearchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    document: String,
    metadata: ChunkMetadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    model: String,
    dimensions: usize,
    updated_at: DateTime<Utc>,
    entries: Vec<StoredEntry>,
}

/// A collection persisted as `<dir>/<name>.json`. Entries keep insertion
/// order so equally scored hits come back in a stable order. The file is
/// written on the first upsert, not on creation.
pub struct LocalCollection {
    path: PathBuf,
    name: String,
    embedder: Arc<dyn Embedder>,
    entries: Vec<StoredEntry>,
    positions: HashMap<String, usize>,
}

impl LocalCollection {
    pub async fn open_or_create(
        dir: &Path,
        name: &str,
        embedder: &EmbedderConfig,
        dimensions: usize,
    ) -> Result<Self, SearchError> {
        let path = collection_path(dir, name);

        if fs::try_exists(&path).await? {
            let file = read_file(&path, name).await?;
            if file.dimensions != dimensions {
                warn!(
                    collection = name,
                    stored = file.dimensions,
                    requested = dimensions,
                    "keeping stored embedding dimensions"
                );
            }
            return Self::from_file(path, file, embedder);
        }

        info!(collection = name, path = %path.display(), model = embedder.model(), "creating collection");
        Ok(Self {
            path,
            name: name.to_string(),
            embedder: embedder.build(dimensions)?,
            entries: Vec::new(),
            positions: HashMap::new(),
        })
    }

    /// Opens a collection written by an earlier ingest, with the vector size
    /// it was built with.
    pub async fn open_existing(
        dir: &Path,
        name: &str,
        embedder: &EmbedderConfig,
    ) -> Result<Self, SearchError> {
        let path = collection_path(dir, name);
        if !fs::try_exists(&path).await? {
            return Err(SearchError::CollectionMissing(name.to_string()));
        }
        let file = read_file(&path, name).await?;
        Self::from_file(path, file, embedder)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    fn from_file(
        path: PathBuf,
        file: CollectionFile,
        embedder: &EmbedderConfig,
    ) -> Result<Self, SearchError> {
        if file.model != embedder.model() {
            return Err(SearchError::BackendResponse {
                backend: "local".to_string(),
                details: format!(
                    "collection `{}` was embedded with `{}`, not `{}`",
                    file.name,
                    file.model,
                    embedder.model()
                ),
            });
        }

        let positions = file
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.clone(), position))
            .collect();

        Ok(Self {
            path,
            name: file.name,
            embedder: embedder.build(file.dimensions)?,
            entries: file.entries,
            positions,
        })
    }

    async fn persist(&self) -> Result<(), SearchError> {
        let file = CollectionFile {
            name: self.name.clone(),
            model: self.embedder.model().to_string(),
            dimensions: self.embedder.dimensions(),
            updated_at: Utc::now(),
            entries: self.entries.clone(),
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(&file)?).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

async fn read_file(path: &Path, name: &str) -> Result<CollectionFile, SearchError> {
    let raw = fs::read(path).await?;
    let file: CollectionFile = serde_json::from_slice(&raw)?;

    if file.name != name {
        return Err(SearchError::BackendResponse {
            backend: "local".to_string(),
            details: format!("{} holds collection `{}`", path.display(), file.name),
        });
    }
    Ok(file)
}

#[async_trait]
impl VectorCollection for LocalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&mut self, entries: &[CollectionEntry]) -> Result<(), SearchError> {
        let documents = entries
            .iter()
            .map(|entry| entry.document.as_str())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed_batch(&documents).await?;

        for (entry, embedding) in entries.iter().zip(embeddings) {
            let stored = StoredEntry {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                embedding,
            };

            match self.positions.get(&entry.id) {
                Some(&position) => self.entries[position] = stored,
                None => {
                    self.positions.insert(entry.id.clone(), self.entries.len());
                    self.entries.push(stored);
                }
            }
        }

        self.persist().await
    }

    async fn query(&self, text: &str, n_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(text).await?;

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_vector, &entry.embedding), entry))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(n_results)
            .map(|(score, entry)| SearchHit {
                id: entry.id.clone(),
                text: entry.document.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, SearchError> {
        Ok(self.entries.len())
    }

    async fn clear(&mut self) -> Result<(), SearchError> {
        self.entries.clear();
        self.positions.clear();
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageSource;
    use tempfile::tempdir;

    fn ngram() -> EmbedderConfig {
        EmbedderConfig::CharacterNgram
    }

    fn entry(index: u64, text: &str) -> CollectionEntry {
        CollectionEntry {
            id: format!("policy_chunk_{index}"),
            document: text.to_string(),
            metadata: ChunkMetadata {
                page: 0,
                actual_page: Some(5),
                page_source: Some(PageSource::PdfMetadata),
                chunk_id: index,
                document_type: "financial_policy".to_string(),
                source: "policy.pdf".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_and_persists() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 64).await?;

        collection
            .upsert(&[entry(0, "net debt"), entry(1, "capital works")])
            .await?;
        collection.upsert(&[entry(1, "infrastructure program")]).await?;
        assert_eq!(collection.count().await?, 2);

        let reopened = LocalCollection::open_existing(dir.path(), "financial_policy", &ngram()).await?;
        assert_eq!(reopened.ids(), vec!["policy_chunk_0", "policy_chunk_1"]);
        let hits = reopened.query("infrastructure program", 1).await?;
        assert_eq!(hits[0].id, "policy_chunk_1");
        assert_eq!(hits[0].text, "infrastructure program");
        Ok(())
    }

    #[tokio::test]
    async fn missing_collection_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = LocalCollection::open_existing(dir.path(), "financial_policy", &ngram()).await;
        assert!(matches!(result, Err(SearchError::CollectionMissing(name)) if name == "financial_policy"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_collection_returns_no_hits() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 64).await?;
        assert!(collection.query("anything", 3).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn clear_removes_everything() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 64).await?;
        collection.upsert(&[entry(0, "net debt")]).await?;
        collection.clear().await?;
        assert_eq!(collection.count().await?, 0);

        let reopened = LocalCollection::open_existing(dir.path(), "financial_policy", &ngram()).await?;
        assert_eq!(reopened.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn query_caps_results() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 64).await?;
        let entries = (0..6)
            .map(|index| entry(index, &format!("section {index} of the budget")))
            .collect::<Vec<_>>();
        collection.upsert(&entries).await?;

        let hits = collection.query("budget", 3).await?;
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn reopen_uses_stored_dimensions() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 96).await?;
        collection.upsert(&[entry(0, "net debt")]).await?;

        let reopened =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 384).await?;
        assert_eq!(reopened.embedder.dimensions(), 96);
        let chat = LocalCollection::open_existing(dir.path(), "financial_policy", &ngram()).await?;
        assert_eq!(chat.embedder.dimensions(), 96);
        assert_eq!(chat.query("net debt", 1).await?[0].id, "policy_chunk_0");
        Ok(())
    }

    #[tokio::test]
    async fn other_embedding_model_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut collection =
            LocalCollection::open_or_create(dir.path(), "financial_policy", &ngram(), 64).await?;
        collection.upsert(&[entry(0, "net debt")]).await?;

        let openai = EmbedderConfig::OpenAi {
            api_key: "sk-test".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
        };
        let result = LocalCollection::open_existing(dir.path(), "financial_policy", &openai).await;
        assert!(matches!(result, Err(SearchError::BackendResponse { details, .. }) if details.contains("char-trigram-fnv")));
        Ok(())
    }

    #[tokio::test]
    async fn nothing_is_written_before_first_upsert() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let _collection =
            LocalCollection::open_or_create(&dir.path().join("db"), "financial_policy", &ngram(), 64).await?;

        let result = LocalCollection::open_existing(&dir.path().join("db"), "financial_policy", &ngram()).await;
        assert!(matches!(result, Err(SearchError::CollectionMissing(_))));
        Ok(())
    }
}
