//! Page-level text extraction.
//!
//! Pages that produce no text (scanned images, broken content streams) are skipped, and
//! the surviving pages keep their original 1-based page numbers.

use crate::error::{RetrievalError, RetrievalResult};
use crate::page::Page;
use lopdf::Document;
use tracing::{debug, warn};

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8]) -> RetrievalResult<Vec<Page>>;
}

/// PDF extractor backed by lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8]) -> RetrievalResult<Vec<Page>> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| RetrievalError::Extraction(format!("not a readable PDF: {e}")))?;

        let page_ids = doc.get_pages();
        let total = page_ids.len();
        let mut pages = Vec::with_capacity(total);

        for &page_number in page_ids.keys() {
            match doc.extract_text(&[page_number]) {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        debug!(target: "ragify::extract", "page {page_number} has no text, skipping");
                    } else {
                        pages.push(Page::new(page_number, text));
                    }
                }
                Err(e) => {
                    debug!(target: "ragify::extract", "failed to extract page {page_number}: {e}");
                }
            }
        }

        if pages.is_empty() && total > 0 {
            warn!(target: "ragify::extract", "no extractable text in any of {total} pages");
        }
        debug!(target: "ragify::extract", "extracted {} of {total} pages", pages.len());
        Ok(pages)
    }
}

/// UTF-8 text where form feeds (`\x0C`) separate pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, bytes: &[u8]) -> RetrievalResult<Vec<Page>> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| RetrievalError::Extraction(format!("text is not valid UTF-8: {e}")))?;

        Ok(content
            .split('\x0C')
            .zip(1u32..)
            .filter_map(|(chunk, page_number)| {
                let text = chunk.trim();
                (!text.is_empty()).then(|| Page::new(page_number, text))
            })
            .collect())
    }
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md"];

/// Pick an extractor from the source's extension; anything unrecognised is treated as PDF.
pub fn extractor_for_source(source: &str) -> Box<dyn TextExtractor> {
    let path = source.split(|c: char| c == '?' || c == '#').next().unwrap_or(source);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if TEXT_EXTENSIONS.contains(&ext.as_str()) => Box::new(PlainTextExtractor),
        _ => Box::new(PdfExtractor),
    }
}
