use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_COLLECTION: &str = "financial_policy";
pub const DEFAULT_DOCUMENT_TYPE: &str = "financial_policy";
pub const CHUNK_ID_PREFIX: &str = "policy_chunk_";

/// A window of page text as produced by the splitter, before page tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub text: String,
    /// 0-based page index reported by the PDF extractor.
    pub pdf_page: u32,
}

/// How a chunk's `actual_page` was decided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    ExtractedFromFooter,
    PdfMetadata,
}

impl PageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PageSource::ExtractedFromFooter => "extracted_from_footer",
            PageSource::PdfMetadata => "pdf_metadata",
        }
    }
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChunk {
    pub chunk_id: u64,
    pub text: String,
    pub pdf_page: u32,
    pub actual_page: i32,
    pub page_source: PageSource,
    pub document_type: String,
    pub source: String,
}

impl PolicyChunk {
    pub fn entry_id(&self) -> String {
        format!("{CHUNK_ID_PREFIX}{}", self.chunk_id)
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            page: self.pdf_page,
            actual_page: Some(self.actual_page),
            page_source: Some(self.page_source),
            chunk_id: self.chunk_id,
            document_type: self.document_type.clone(),
            source: self.source.clone(),
        }
    }

    pub fn into_entry(self) -> CollectionEntry {
        CollectionEntry {
            id: self.entry_id(),
            metadata: self.metadata(),
            document: self.text,
        }
    }
}

/// Metadata persisted next to every chunk. `actual_page` and `page_source`
/// are optional so collections written by other tools still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub page: u32,
    #[serde(default)]
    pub actual_page: Option<i32>,
    #[serde(default)]
    pub page_source: Option<PageSource>,
    pub chunk_id: u64,
    pub document_type: String,
    #[serde(default)]
    pub source: String,
}

impl ChunkMetadata {
    /// Page number shown to the model; untagged entries fall back to the
    /// 1-based extractor page.
    pub fn display_page(&self) -> i32 {
        self.actual_page
            .unwrap_or_else(|| i32::try_from(self.page).unwrap_or(i32::MAX - 1) + 1)
    }

    pub fn is_footer_derived(&self) -> bool {
        self.page_source == Some(PageSource::ExtractedFromFooter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionEntry {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Added to the extractor page index when no footer page is found.
    pub page_offset: i32,
    pub document_type: String,
    /// Clear the collection before upserting.
    pub replace_existing: bool,
}

impl IngestionOptions {
    pub fn with_page_offset(page_offset: i32) -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            page_offset,
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            replace_existing: false,
        }
    }
}
