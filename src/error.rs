//! Error types for the edgequake-pdf2xlsx library.
//!
//! Three error types reflect three scopes of failure:
//!
//! * [`Pdf2XlsxError`] — **Fatal**: the document cannot be processed at all
//!   (bad input file, invalid credentials, no table found anywhere). Returned as
//!   `Err(Pdf2XlsxError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] — **Recoverable**: a single page failed (rate limit never
//!   cleared, the model answered with garbage) but the other pages are fine.
//!   Stored inside [`crate::output::PageReport`] so callers can inspect partial
//!   success.
//!
//! * [`ExtractionError`] — the outcome of one call to the vision service. The
//!   page pipeline maps it to one of the two above.

use edgequake_llm::LlmError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2xlsx library.
#[derive(Debug, Error)]
pub enum Pdf2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision service rejected our credentials. Retrying cannot help.
    #[error("Invalid API credentials (page {page}): {detail}\nCheck your API key and try again.")]
    InvalidCredentials { page: usize, detail: String },

    /// A page failed and the configured policy says to abort the document.
    #[error("Extraction aborted on page {page}: {detail}")]
    ExtractionAborted { page: usize, detail: String },

    /// Every page was attempted and none produced a table.
    #[error("{}", no_tables_message(.pages, .rate_limited_pages))]
    NoTablesFound {
        pages: usize,
        rate_limited_pages: usize,
    },

    /// The caller cancelled the run between two pages.
    #[error("Extraction cancelled after {completed} of {total} pages")]
    Cancelled { completed: usize, total: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Nothing to write: the workbook has no sheet.
    #[error("Workbook has no sheets to write")]
    EmptyWorkbook,

    /// Could not create or write the output workbook.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The zip container rejected an entry.
    #[error("Failed to encode workbook: {0}")]
    WorkbookEncoding(String),

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn no_tables_message(pages: &usize, rate_limited_pages: &usize) -> String {
    if *rate_limited_pages > 0 {
        format!(
            "No table found in {pages} page(s); {rate_limited_pages} page(s) hit the API rate limit.\n\
Wait about a minute and try again with a smaller document or fewer pages."
        )
    } else {
        format!(
            "No table found in {pages} page(s).\n\
The document may contain no tables, or the page images are too low quality (try a higher --dpi)."
        )
    }
}

/// A recoverable error for a single page.
///
/// The page contributes zero tables and the run continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page image could not be encoded for upload.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Still rate limited after every retry.
    #[error("Page {page}: rate limited after {attempts} attempts: {detail}")]
    RateLimited {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The model answered with no text.
    #[error("Page {page}: empty response from the model")]
    EmptyResponse { page: usize },

    /// The model answered with something that is not the requested JSON.
    #[error("Page {page}: malformed response: {detail}")]
    MalformedResponse { page: usize, detail: String },

    /// Network or service failure other than rate limiting.
    #[error("Page {page}: extraction call failed: {detail}")]
    Transport { page: usize, detail: String },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::EncodeFailed { page, .. }
            | PageError::RateLimited { page, .. }
            | PageError::EmptyResponse { page }
            | PageError::MalformedResponse { page, .. }
            | PageError::Transport { page, .. } => *page,
        }
    }
}

/// Outcome of one failed call to the vision-extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("no text in model response")]
    EmptyResponse,

    #[error("response is not valid table JSON: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Transport(String),
}

/// Markers in a service error description that identify a rejected API key.
const CREDENTIAL_MARKERS: &[&str] = &[
    "API_KEY_INVALID",
    "invalid_api_key",
    "Incorrect API key",
    "invalid x-api-key",
    "401 Unauthorized",
    "PERMISSION_DENIED",
];

impl ExtractionError {
    /// Classify a transport/service failure from its description.
    pub fn from_service_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if crate::pipeline::retry::is_rate_limit_message(&message) {
            ExtractionError::RateLimited(message)
        } else if CREDENTIAL_MARKERS.iter().any(|m| message.contains(m)) {
            ExtractionError::InvalidCredentials(message)
        } else {
            ExtractionError::Transport(message)
        }
    }

    /// Classify a provider error, by variant where the provider already
    /// decided, by description otherwise.
    pub fn from_llm_error(error: LlmError) -> Self {
        match error {
            LlmError::RateLimited(_) => ExtractionError::RateLimited(error.to_string()),
            LlmError::AuthError(_) => ExtractionError::InvalidCredentials(error.to_string()),
            LlmError::Timeout | LlmError::NetworkError(_) => {
                ExtractionError::Transport(error.to_string())
            }
            other => ExtractionError::from_service_message(other.to_string()),
        }
    }

    /// Convert into the recoverable page-level form.
    pub fn into_page_error(self, page: usize, attempts: u32) -> PageError {
        match self {
            ExtractionError::RateLimited(detail) => PageError::RateLimited {
                page,
                attempts,
                detail,
            },
            ExtractionError::EmptyResponse => PageError::EmptyResponse { page },
            ExtractionError::MalformedResponse(detail) => {
                PageError::MalformedResponse { page, detail }
            }
            ExtractionError::InvalidCredentials(detail) | ExtractionError::Transport(detail) => {
                PageError::Transport { page, detail }
            }
        }
    }
}

impl From<LlmError> for ExtractionError {
    fn from(error: LlmError) -> Self {
        ExtractionError::from_llm_error(error)
    }
}

impl crate::pipeline::retry::Retryable for ExtractionError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ExtractionError::RateLimited(_))
    }
}
