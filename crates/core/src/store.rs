use crate::error::SearchError;
use crate::models::{CollectionEntry, SearchHit};
use async_trait::async_trait;

/// A named collection that embeds documents itself and ranks them by
/// similarity to a query string.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Inserts entries, overwriting any entry that already has the same id.
    async fn upsert(&mut self, entries: &[CollectionEntry]) -> Result<(), SearchError>;

    /// Returns at most `n_results` hits, most relevant first.
    async fn query(&self, text: &str, n_results: usize) -> Result<Vec<SearchHit>, SearchError>;

    async fn count(&self) -> Result<usize, SearchError>;

    async fn clear(&mut self) -> Result<(), SearchError>;
}
