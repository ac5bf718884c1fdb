//! Recovering printed page numbers from chunk text and tagging chunks with
//! their best-guess document page.

use crate::error::IngestError;
use crate::models::{PageSource, PolicyChunk, RawChunk};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Footer patterns for the 2005-06 Budget Paper No. 3 layout, most specific first.
pub const BUDGET_PAPER_FOOTER_PATTERNS: [&str; 3] = [
    r"2005-06 Budget Paper No\. \d+\s+(\d+)\s+Financial Policy",
    r"Budget Paper No\. \d+\s+(\d+)\s+Financial Policy",
    r"Budget.*?Paper.*?(\d+)\s+Financial Policy.*?Statement",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLookup {
    Found { page: i32, pattern: usize },
    NotFound,
}

pub trait PageNumberRecoverer {
    fn recover(&self, text: &str) -> PageLookup;
}

/// Tries each pattern in order. The first pattern that matches decides: its
/// capture is the page, or the lookup fails if the capture is not an `i32`.
#[derive(Debug, Clone)]
pub struct FooterPatternRecoverer {
    patterns: Vec<Regex>,
}

impl FooterPatternRecoverer {
    pub fn new<I, S>(patterns: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        if patterns.is_empty() {
            return Err(IngestError::InvalidArgument(
                "at least one footer pattern is required".to_string(),
            ));
        }

        if let Some(pattern) = patterns.iter().find(|re| re.captures_len() < 2) {
            return Err(IngestError::InvalidArgument(format!(
                "footer pattern has no capture group: {pattern}"
            )));
        }

        Ok(Self { patterns })
    }

    pub fn budget_paper() -> Result<Self, IngestError> {
        Self::new(BUDGET_PAPER_FOOTER_PATTERNS)
    }
}

impl PageNumberRecoverer for FooterPatternRecoverer {
    fn recover(&self, text: &str) -> PageLookup {
        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(group) = pattern.captures(text).and_then(|captures| captures.get(1)) else {
                continue;
            };

            return match group.as_str().trim().parse::<i32>() {
                Ok(page) => PageLookup::Found {
                    page,
                    pattern: index,
                },
                Err(error) => {
                    debug!(capture = group.as_str(), %error, "footer capture is not a page number");
                    PageLookup::NotFound
                }
            };
        }

        PageLookup::NotFound
    }
}

/// Assigns exactly one actual page and source tag to every chunk.
pub fn enrich_chunks<R>(
    chunks: Vec<RawChunk>,
    recoverer: &R,
    page_offset: i32,
    document_type: &str,
    source: &str,
) -> Vec<PolicyChunk>
where
    R: PageNumberRecoverer + ?Sized,
{
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let (actual_page, page_source, footer_pattern) = match recoverer.recover(&chunk.text) {
                PageLookup::Found { page, pattern } => {
                    (page, PageSource::ExtractedFromFooter, Some(pattern))
                }
                PageLookup::NotFound => (
                    i32::try_from(chunk.pdf_page)
                        .unwrap_or(i32::MAX)
                        .saturating_add(page_offset),
                    PageSource::PdfMetadata,
                    None,
                ),
            };

            debug!(
                chunk = index,
                pdf_page = chunk.pdf_page,
                actual_page,
                source = %page_source,
                footer_pattern,
                "tagged chunk"
            );

            PolicyChunk {
                chunk_id: index as u64,
                text: chunk.text,
                pdf_page: chunk.pdf_page,
                actual_page,
                page_source,
                document_type: document_type.to_string(),
                source: source.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recoverer() -> FooterPatternRecoverer {
        FooterPatternRecoverer::budget_paper().expect("default patterns compile")
    }

    #[test]
    fn footer_page_is_extracted() {
        let text = "net debt levels ... 2005-06 Budget Paper No. 3 9 Financial Policy Statement";
        assert_eq!(
            recoverer().recover(text),
            PageLookup::Found {
                page: 9,
                pattern: 0
            }
        );
    }

    #[test]
    fn less_specific_pattern_matches_case_insensitively() {
        let text = "budget paper no. 3\n12\nfinancial policy";
        assert_eq!(
            recoverer().recover(text),
            PageLookup::Found {
                page: 12,
                pattern: 1
            }
        );
    }

    #[test]
    fn loose_pattern_requires_statement_suffix() {
        let recoverer = recoverer();
        assert_eq!(
            recoverer.recover("Budget Paper 14 Financial Policy Statement"),
            PageLookup::Found {
                page: 14,
                pattern: 2
            }
        );
        assert_eq!(
            recoverer.recover("Budget Paper 14 Financial Policy"),
            PageLookup::NotFound
        );
    }

    #[test]
    fn text_without_footer_is_not_found() {
        assert_eq!(
            recoverer().recover("The Government will maintain a AAA credit rating."),
            PageLookup::NotFound
        );
    }

    #[test]
    fn custom_patterns_need_a_capture_group() {
        assert!(FooterPatternRecoverer::new([r"Page \d+"]).is_err());
        assert!(FooterPatternRecoverer::new(Vec::<String>::new()).is_err());

        let custom = FooterPatternRecoverer::new([r"Annual Report\s+(\d+)"])
            .expect("custom pattern compiles");
        assert_eq!(
            custom.recover("annual report 42"),
            PageLookup::Found {
                page: 42,
                pattern: 0
            }
        );
    }

    #[test]
    fn oversized_capture_is_not_found_without_falling_through() {
        let custom = FooterPatternRecoverer::new([r"Page (\d+)", r"Folio (\d+)"])
            .expect("custom patterns compile");
        assert_eq!(
            custom.recover("Page 99999999999 Folio 4"),
            PageLookup::NotFound
        );
        assert_eq!(
            custom.recover("Folio 4"),
            PageLookup::Found {
                page: 4,
                pattern: 1
            }
        );
        assert_eq!(
            recoverer()
                .recover("2005-06 Budget Paper No. 3 99999999999 Financial Policy Statement"),
            PageLookup::NotFound
        );
    }

    #[test]
    fn every_chunk_gets_one_page_and_one_source() {
        let chunks = vec![
            RawChunk {
                text: "Budget Paper No. 3 9 Financial Policy".to_string(),
                pdf_page: 4,
            },
            RawChunk {
                text: "Infrastructure spending".to_string(),
                pdf_page: 0,
            },
            RawChunk {
                text: "Revenue sources".to_string(),
                pdf_page: 2,
            },
        ];

        let enriched = enrich_chunks(chunks, &recoverer(), 5, "financial_policy", "policy.pdf");

        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[0].actual_page, 9);
        assert_eq!(enriched[0].page_source, PageSource::ExtractedFromFooter);
        assert_eq!(enriched[1].actual_page, 5);
        assert_eq!(enriched[1].page_source, PageSource::PdfMetadata);
        assert_eq!(enriched[2].actual_page, 7);
        assert_eq!(
            enriched.iter().map(|chunk| chunk.chunk_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn negative_offset_is_applied() {
        let chunks = vec![RawChunk {
            text: "cover".to_string(),
            pdf_page: 1,
        }];
        let enriched = enrich_chunks(chunks, &recoverer(), -2, "financial_policy", "policy.pdf");
        assert_eq!(enriched[0].actual_page, -1);
    }
}
