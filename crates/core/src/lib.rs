pub mod chunking;
pub mod completion;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod history;
pub mod ingest;
pub mod models;
pub mod pages;
pub mod prompt;
pub mod session;
pub mod store;
pub mod stores;

pub use chunking::{ChunkingConfig, RecursiveCharacterSplitter};
pub use completion::{ChatCompletion, CompletionSettings, OpenAiChatClient, API_KEY_ENV};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbedderConfig, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{ChatError, IngestError, SearchError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use history::{ConversationHistory, DEFAULT_HISTORY_CAPACITY};
pub use ingest::{
    ingest_document, page_histogram, prepare_chunks, IngestionReport, PageHistogram,
};
pub use models::{
    ChunkMetadata, CollectionEntry, Exchange, IngestionOptions, PageSource, PolicyChunk, RawChunk,
    SearchHit, DEFAULT_COLLECTION, DEFAULT_DOCUMENT_TYPE,
};
pub use pages::{
    enrich_chunks, FooterPatternRecoverer, PageLookup, PageNumberRecoverer,
    BUDGET_PAPER_FOOTER_PATTERNS,
};
pub use prompt::build_system_prompt;
pub use session::{ChatSession, DEFAULT_TOP_K};
pub use store::VectorCollection;
pub use stores::{LocalCollection, QdrantCollection};
