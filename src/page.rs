use crate::config::Number;
use serde::{Deserialize, Serialize};

/// One unit of extracted text. `page_number` is the 1-based position in the source
/// document, so gaps appear where pages produced no text.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A ranked hit. Lower `similarity_score` means closer (squared L2 distance).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchResult {
    pub page_number: u32,
    pub text: String,
    pub similarity_score: Number,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    /// Number of vectors in the searched artifact.
    pub record_count: usize,
    pub results: Vec<SearchResult>,
}
