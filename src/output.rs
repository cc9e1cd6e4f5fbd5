//! Result types returned by the extraction entry points.

use crate::error::PageError;
use crate::table::ExtractedTable;
use serde::{Deserialize, Serialize};

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Tables in page order, then in the order the model listed them.
    pub tables: Vec<ExtractedTable>,
    /// One entry per attempted page.
    pub pages: Vec<PageReport>,
    pub stats: ExtractionStats,
}

/// Outcome of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    pub table_count: usize,
    /// Wall-clock time including retries.
    pub duration_ms: u64,
    /// Set when the page was skipped.
    pub error: Option<PageError>,
}

/// Run statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Selected pages that were sent to the model.
    pub processed_pages: usize,
    pub pages_with_tables: usize,
    /// Pages skipped after a recoverable failure (including encode failures).
    pub failed_pages: usize,
    pub table_count: usize,
    pub row_count: usize,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ExtractionOutput {
    /// Errors of every skipped page.
    pub fn page_errors(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }
}
