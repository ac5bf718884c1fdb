mod repl;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use policy_rag_core::completion::{DEFAULT_API_BASE, DEFAULT_MODEL};
use policy_rag_core::{
    ingest_document, ChatSession, CompletionSettings, EmbedderConfig, FooterPatternRecoverer,
    IngestError, IngestionOptions, LocalCollection, LopdfExtractor, OpenAiChatClient,
    QdrantCollection, SearchError, VectorCollection, API_KEY_ENV, DEFAULT_COLLECTION,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "policy-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store backend
    #[arg(long, value_enum, default_value_t = StoreBackend::Local, env = "POLICY_RAG_STORE", global = true)]
    store: StoreBackend,

    /// Directory holding the local collection files
    #[arg(long, default_value = "policy_db", env = "POLICY_RAG_DB_PATH", global = true)]
    db_path: PathBuf,

    /// Collection name
    #[arg(long, default_value = DEFAULT_COLLECTION, env = "POLICY_RAG_COLLECTION", global = true)]
    collection: String,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333", env = "QDRANT_URL", global = true)]
    qdrant_url: String,

    /// Embedding dimensions for new collections; existing collections keep theirs
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS, global = true)]
    dimensions: usize,

    /// Embedding backend; ingest and chat must agree
    #[arg(long, value_enum, default_value_t = EmbedderBackend::Ngram, env = "POLICY_RAG_EMBEDDER", global = true)]
    embedder: EmbedderBackend,

    /// Embedding model for the openai embedder
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL, env = "OPENAI_EMBEDDING_MODEL", global = true)]
    embedding_model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, default_value = DEFAULT_API_BASE, env = "OPENAI_BASE_URL", global = true)]
    api_base: String,

    /// API key for completions and openai embeddings
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreBackend {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderBackend {
    /// Hashed character trigrams, offline
    Ngram,
    /// OpenAI `/embeddings`
    Openai,
}

#[derive(Subcommand)]
enum Command {
    /// Split a PDF into page-tagged chunks and upsert them into the collection.
    Ingest {
        /// PDF document to ingest.
        #[arg(long, default_value = "policy.pdf", env = "POLICY_RAG_PDF")]
        pdf: PathBuf,
        /// Added to the 0-based PDF page index when no footer page is found.
        #[arg(long, env = "PAGE_OFFSET", allow_hyphen_values = true)]
        page_offset: i32,
        /// Maximum characters per chunk.
        #[arg(long, default_value_t = 1_000)]
        chunk_size: usize,
        /// Characters shared between neighbouring chunks.
        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,
        /// Footer regex with one capture group for the page number; repeat in priority order.
        #[arg(long = "footer-pattern")]
        footer_patterns: Vec<String>,
        /// Clear the collection before upserting.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Ask questions about the ingested document.
    Chat {
        /// Number of excerpts retrieved per question.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Chat completion model.
        #[arg(long, default_value = DEFAULT_MODEL, env = "OPENAI_MODEL")]
        model: String,
        /// Sampling temperature.
        #[arg(long, default_value_t = 0.1)]
        temperature: f32,
        /// Maximum tokens in a reply.
        #[arg(long, default_value_t = 1_000)]
        max_tokens: u32,
    },
}

fn fatal(message: impl std::fmt::Display) -> ! {
    error!("{message}");
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn api_key(cli: &Cli) -> Option<&str> {
    cli.api_key.as_deref().filter(|key| !key.trim().is_empty())
}

fn embedder_config(cli: &Cli) -> EmbedderConfig {
    match cli.embedder {
        EmbedderBackend::Ngram => EmbedderConfig::CharacterNgram,
        EmbedderBackend::Openai => {
            let Some(key) = api_key(cli) else {
                fatal(format!(
                    "{API_KEY_ENV} not found. The openai embedder needs it for ingest and chat."
                ));
            };
            EmbedderConfig::OpenAi {
                api_key: key.to_string(),
                api_base: cli.api_base.clone(),
                model: cli.embedding_model.clone(),
            }
        }
    }
}

async fn open_collection(
    cli: &Cli,
    embedder: &EmbedderConfig,
    create: bool,
) -> Result<Box<dyn VectorCollection>, SearchError> {
    let collection: Box<dyn VectorCollection> = match (cli.store, create) {
        (StoreBackend::Local, true) => Box::new(
            LocalCollection::open_or_create(&cli.db_path, &cli.collection, embedder, cli.dimensions)
                .await?,
        ),
        (StoreBackend::Local, false) => Box::new(
            LocalCollection::open_existing(&cli.db_path, &cli.collection, embedder).await?,
        ),
        (StoreBackend::Qdrant, true) => Box::new(
            QdrantCollection::open_or_create(&cli.qdrant_url, &cli.collection, embedder, cli.dimensions)
                .await?,
        ),
        (StoreBackend::Qdrant, false) => Box::new(
            QdrantCollection::open_existing(&cli.qdrant_url, &cli.collection, embedder).await?,
        ),
    };
    Ok(collection)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "policy-rag boot"
    );

    match &cli.command {
        Command::Ingest {
            pdf,
            page_offset,
            chunk_size,
            chunk_overlap,
            footer_patterns,
            replace,
        } => {
            let recoverer = if footer_patterns.is_empty() {
                FooterPatternRecoverer::budget_paper()?
            } else {
                FooterPatternRecoverer::new(footer_patterns)?
            };

            let mut options = IngestionOptions::with_page_offset(*page_offset);
            options.chunk_size = *chunk_size;
            options.chunk_overlap = *chunk_overlap;
            options.replace_existing = *replace;

            let embedder = embedder_config(&cli);
            let mut collection = open_collection(&cli, &embedder, true).await?;
            let report = match ingest_document(
                pdf,
                &options,
                &LopdfExtractor,
                &recoverer,
                collection.as_mut(),
            )
            .await
            {
                Ok(report) => report,
                Err(IngestError::MissingSource(path)) => fatal(format!(
                    "{path} not found. Please ensure the policy PDF is in place."
                )),
                Err(other) => return Err(other.into()),
            };

            println!(
                "Successfully added {} chunks from {} pages to `{}` at {}",
                report.chunk_count(),
                report.page_count,
                collection.name(),
                Utc::now().to_rfc3339()
            );
            println!("source sha256: {}", report.checksum);
            println!(
                "footer-tagged chunks: {}, offset-tagged chunks: {}, collection size: {}",
                report.extracted_count(),
                report.fallback_count(),
                report.collection_count
            );

            println!("\nPage Number Extraction Summary:");
            for ((page, source), count) in report.histogram() {
                println!("  Page {page} ({source}): {count} chunks");
            }
            println!("\nDatabase setup complete. You can now run `policy-rag chat`.");
        }
        Command::Chat {
            top_k,
            model,
            temperature,
            max_tokens,
        } => {
            let Some(key) = api_key(&cli) else {
                fatal(format!(
                    "{API_KEY_ENV} not found. Add it to the environment or a .env file."
                ));
            };

            let embedder = embedder_config(&cli);
            let collection = match open_collection(&cli, &embedder, false).await {
                Ok(collection) => collection,
                Err(SearchError::CollectionMissing(name)) => fatal(format!(
                    "collection `{name}` not found. Run `policy-rag ingest` first."
                )),
                Err(other) => fatal(other),
            };

            let settings = CompletionSettings {
                api_base: cli.api_base.clone(),
                model: model.clone(),
                temperature: *temperature,
                max_tokens: *max_tokens,
            };
            let client = OpenAiChatClient::new(key, settings).unwrap_or_else(|error| fatal(error));

            let mut session = ChatSession::new(collection, Box::new(client)).with_top_k(*top_k);
            let count = session.document_count().await.unwrap_or_else(|error| fatal(error));
            println!("Financial Policy Chatbot initialized successfully!");
            println!(
                "Database contains {count} document chunks in `{}`.",
                session.collection_name()
            );

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            repl::run(&mut session, stdin, &mut stdout).await?;
        }
    }

    Ok(())
}
