use crate::completion::ChatCompletion;
use crate::error::ChatError;
use crate::history::ConversationHistory;
use crate::models::SearchHit;
use crate::prompt::build_system_prompt;
use crate::store::VectorCollection;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 3;

/// One conversation: an open collection, a completion client and the
/// bounded history. Lives for the whole chat process.
pub struct ChatSession {
    collection: Box<dyn VectorCollection>,
    completion: Box<dyn ChatCompletion>,
    history: ConversationHistory,
    top_k: usize,
}

impl ChatSession {
    pub fn new(collection: Box<dyn VectorCollection>, completion: Box<dyn ChatCompletion>) -> Self {
        Self {
            collection,
            completion,
            history: ConversationHistory::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    pub async fn document_count(&self) -> Result<usize, ChatError> {
        Ok(self.collection.count().await?)
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>, ChatError> {
        Ok(self.collection.query(question, self.top_k).await?)
    }

    /// Runs one turn. History only grows when the completion succeeds.
    pub async fn ask(&mut self, question: &str) -> Result<String, ChatError> {
        let hits = self.retrieve(question).await?;
        debug!(question, hits = hits.len(), "retrieved excerpts");

        let system_prompt = build_system_prompt(question, &self.history, &hits);
        let answer = self.completion.complete(&system_prompt, question).await?;

        self.history.push(question, answer.clone());
        Ok(answer)
    }
}
