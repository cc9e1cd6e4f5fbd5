//! # edgequake-pdf2xlsx
//!
//! Extract tables from PDF documents into Excel workbooks using Vision
//! Language Models.
//!
//! Scanned statements, invoices and reports rarely carry a usable text
//! layer. This crate rasterises each page, asks a vision model to read every
//! table on it as structured JSON, and lays the tables out as worksheets:
//! one sheet per table, or everything merged into a single sheet.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode   JPEG/PNG → base64
//!  ├─ 4. Extract  one vision call per page, in order, paced, with backoff
//!  ├─ 5. Assemble tables → named sheets
//!  └─ 6. Encode   sheets → .xlsx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2xlsx::{extract_to_xlsx, ExportMode, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let stats = extract_to_xlsx("statement.pdf", "statement_ocr.xlsx", ExportMode::SeparateSheets, &config).await?;
//!     eprintln!("{} tables, {} rows", stats.table_count, stats.row_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2xlsx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod table;
pub mod workbook;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, MalformedResponsePolicy, PageImageFormat, PageSelection,
    TransportFailurePolicy,
};
pub use convert::{extract_tables, extract_tables_from_bytes, extract_tables_sync, extract_to_xlsx};
pub use error::{ExtractionError, PageError, Pdf2XlsxError};
pub use output::{ExtractionOutput, ExtractionStats, PageReport};
pub use pipeline::extract::{TableExtractor, VisionTableExtractor};
pub use pipeline::pages::{run_pages, PageRunOutput, PageRunSettings};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use table::{ExtractedTable, Row};
pub use workbook::{suggested_filename, ExportMode, Sheet, Workbook};
