//! Pipeline stages for PDF-to-workbook table extraction.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ pages ──▶ (workbook)
//! (URL/path) (pdfium)  (base64)   │
//!                                 ├─ retry    backoff on rate limits
//!                                 └─ extract  one vision call per page
//! ```
//!
//! 1. [`input`]   — resolve a path or URL to a local, signature-checked PDF
//! 2. [`render`]  — rasterise the selected pages on a blocking thread
//! 3. [`encode`]  — JPEG/PNG-encode and base64-wrap each page image
//! 4. [`pages`]   — walk the pages in order with pacing and failure policy
//! 5. [`retry`]   — exponential backoff around one extraction call
//! 6. [`extract`] — the vision request and response validation

pub mod encode;
pub mod extract;
pub mod input;
pub mod pages;
pub mod render;
pub mod retry;
