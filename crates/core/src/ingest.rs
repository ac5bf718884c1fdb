use crate::chunking::{ChunkingConfig, RecursiveCharacterSplitter};
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::{CollectionEntry, IngestionOptions, PageSource, PolicyChunk};
use crate::pages::{enrich_chunks, PageNumberRecoverer};
use crate::store::VectorCollection;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub type PageHistogram = BTreeMap<(i32, PageSource), usize>;

pub struct IngestionReport {
    pub source: PathBuf,
    pub checksum: String,
    pub page_count: usize,
    pub chunks: Vec<PolicyChunk>,
    pub collection_count: usize,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn extracted_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| chunk.page_source == PageSource::ExtractedFromFooter)
            .count()
    }

    pub fn fallback_count(&self) -> usize {
        self.chunk_count() - self.extracted_count()
    }

    pub fn histogram(&self) -> PageHistogram {
        page_histogram(&self.chunks)
    }

    pub fn ids(&self) -> Vec<String> {
        self.chunks.iter().map(PolicyChunk::entry_id).collect()
    }
}

/// Chunk counts per (actual page, source), ordered by page then source.
pub fn page_histogram(chunks: &[PolicyChunk]) -> PageHistogram {
    let mut histogram = PageHistogram::new();
    for chunk in chunks {
        *histogram
            .entry((chunk.actual_page, chunk.page_source))
            .or_default() += 1;
    }
    histogram
}

fn ensure_source_exists(path: &Path) -> Result<(), IngestError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::MissingSource(path.display().to_string()))
    }
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads, splits and page-tags a document without touching any store.
pub fn prepare_chunks<E, R>(
    path: &Path,
    options: &IngestionOptions,
    extractor: &E,
    recoverer: &R,
) -> Result<(Vec<PolicyChunk>, usize), IngestError>
where
    E: PdfExtractor + ?Sized,
    R: PageNumberRecoverer + ?Sized,
{
    ensure_source_exists(path)?;
    let splitter = RecursiveCharacterSplitter::new(ChunkingConfig::from(options))?;

    let pages = extractor.extract_pages(path)?;
    info!(pages = pages.len(), path = %path.display(), "loaded document");

    let raw_chunks = splitter.split_pages(&pages);
    info!(
        chunks = raw_chunks.len(),
        chunk_size = options.chunk_size,
        chunk_overlap = options.chunk_overlap,
        "split document"
    );

    let chunks = enrich_chunks(
        raw_chunks,
        recoverer,
        options.page_offset,
        &options.document_type,
        &path.to_string_lossy(),
    );

    Ok((chunks, pages.len()))
}

pub async fn ingest_document<E, R>(
    path: &Path,
    options: &IngestionOptions,
    extractor: &E,
    recoverer: &R,
    collection: &mut dyn VectorCollection,
) -> Result<IngestionReport, IngestError>
where
    E: PdfExtractor + ?Sized,
    R: PageNumberRecoverer + ?Sized,
{
    let (chunks, page_count) = prepare_chunks(path, options, extractor, recoverer)?;
    let checksum = digest_file(path)?;

    let extracted = chunks
        .iter()
        .filter(|chunk| chunk.page_source == PageSource::ExtractedFromFooter)
        .count();
    info!(
        extracted,
        fallback = chunks.len() - extracted,
        page_offset = options.page_offset,
        "tagged chunk pages"
    );

    if options.replace_existing {
        info!(collection = collection.name(), "clearing collection before upsert");
        collection.clear().await?;
    }

    let entries: Vec<CollectionEntry> = chunks.iter().cloned().map(PolicyChunk::into_entry).collect();
    collection.upsert(&entries).await?;
    let collection_count = collection.count().await?;

    info!(
        upserted = entries.len(),
        collection = collection.name(),
        collection_count,
        "upserted chunks"
    );

    Ok(IngestionReport {
        source: path.to_path_buf(),
        checksum,
        page_count,
        chunks,
        collection_count,
    })
}
