//! Extracted table model.
//!
//! A table is a name, an ordered header list and rows keyed by header. Rows
//! are produced by the extraction client from the model's positional arrays;
//! the positional form never leaves [`crate::pipeline::extract`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row: header name → cell text.
///
/// Values are always text. Numbers, dates and currency amounts are kept
/// exactly as printed on the page.
pub type Row = HashMap<String, String>;

/// A table found on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTable {
    /// Caption or title of the table. May be empty; the workbook assembler
    /// supplies a fallback sheet name.
    pub table_name: String,
    /// Column names in page order. Not necessarily unique.
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ExtractedTable {
    /// Build a table from positional rows, one value per header.
    ///
    /// Short rows are padded with empty strings, extra values are dropped.
    /// Every header therefore has an entry in every row.
    pub fn from_positional<S: AsRef<str>>(
        table_name: impl Into<String>,
        headers: Vec<String>,
        data: &[Vec<S>],
    ) -> Self {
        let rows = data
            .iter()
            .map(|values| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| {
                        let v = values.get(i).map(|s| s.as_ref()).unwrap_or("");
                        (h.clone(), v.to_string())
                    })
                    .collect()
            })
            .collect();

        Self {
            table_name: table_name.into(),
            headers,
            rows,
        }
    }

    /// Cell text for `header` in row `row`, empty when absent.
    pub fn cell(&self, row: usize, header: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(header))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
