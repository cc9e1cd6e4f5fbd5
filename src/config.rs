//! Configuration types for table extraction.
//!
//! Everything the pipeline needs (provider, retry constants, pacing, page
//! selection, policies) lives in [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. Nothing is read from ambient state once the
//! config is built: credentials reach the extraction client through the
//! provider handle resolved from this struct.

use crate::error::Pdf2XlsxError;
use crate::pipeline::pages::PageRunSettings;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for one PDF-to-workbook extraction run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2xlsx::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .model("gemini-2.0-flash")
///     .max_attempts(3)
///     .page_delay_ms(2000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Encoding of page images sent to the model. Default: JPEG.
    pub image_format: PageImageFormat,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// Table JSON is verbose; a dense page can exceed 4 000 tokens and a
    /// truncated answer is unparseable.
    pub max_tokens: usize,

    /// Total attempts per page when rate limited. Default: 4.
    pub max_attempts: u32,

    /// Backoff base in milliseconds. Default: 2000.
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff. Default: 1000.
    /// Must not exceed `retry_base_delay_ms`.
    pub retry_max_jitter_ms: u64,

    /// Fixed pause before every page after the first. Default: 1500.
    pub page_delay_ms: u64,

    /// What to do when the model answers with unparseable JSON.
    pub malformed_response: MalformedResponsePolicy,

    /// What to do on a non-rate-limit network/service failure.
    pub transport_failure: TransportFailurePolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom extraction instruction. The response schema is always appended.
    pub instruction: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout for the vision service in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Receives progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Interrupts pacing and the page in flight; cancelling ends the run with
    /// [`Pdf2XlsxError::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            image_format: PageImageFormat::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            max_attempts: 4,
            retry_base_delay_ms: 2000,
            retry_max_jitter_ms: 1000,
            page_delay_ms: 1500,
            malformed_response: MalformedResponsePolicy::default(),
            transport_failure: TransportFailurePolicy::default(),
            password: None,
            instruction: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_format", &self.image_format)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_jitter_ms", &self.retry_max_jitter_ms)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("malformed_response", &self.malformed_response)
            .field("transport_failure", &self.transport_failure)
            .field("pages", &self.pages)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backoff schedule for the retry controller.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_jitter: Duration::from_millis(self.retry_max_jitter_ms),
        }
    }

    /// Settings consumed by [`crate::pipeline::pages::run_pages`].
    pub fn page_run_settings(&self) -> PageRunSettings {
        PageRunSettings {
            retry: self.retry_policy(),
            page_delay: Duration::from_millis(self.page_delay_ms),
            malformed_response: self.malformed_response,
            transport_failure: self.transport_failure,
            cancel: self.cancel.clone(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_format(mut self, format: PageImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_max_jitter_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_jitter_ms = ms;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn malformed_response(mut self, policy: MalformedResponsePolicy) -> Self {
        self.config.malformed_response = policy;
        self
    }

    pub fn transport_failure(mut self, policy: TransportFailurePolicy) -> Self {
        self.config.transport_failure = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn instruction(mut self, prompt: impl Into<String>) -> Self {
        self.config.instruction = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2XlsxError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.retry_base_delay_ms == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "retry_base_delay_ms must be > 0".into(),
            ));
        }
        // Keeps the backoff schedule strictly increasing whatever the jitter.
        if c.retry_max_jitter_ms > c.retry_base_delay_ms {
            return Err(Pdf2XlsxError::InvalidConfig(format!(
                "retry_max_jitter_ms ({}) must not exceed retry_base_delay_ms ({})",
                c.retry_max_jitter_ms, c.retry_base_delay_ms
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "api_timeout_secs must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image encoding used for the page payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageImageFormat {
    /// Smaller uploads; fine for printed tables. (default)
    #[default]
    Jpeg,
    /// Lossless; better for tiny fonts, roughly 3× larger.
    Png,
}

impl PageImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            PageImageFormat::Jpeg => "image/jpeg",
            PageImageFormat::Png => "image/png",
        }
    }
}

/// Handling of a model answer that is not the requested JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MalformedResponsePolicy {
    /// Log it, count the page as having no tables, continue. (default)
    #[default]
    SkipPage,
    /// Abort the whole document.
    Abort,
}

/// Handling of a network/service failure that is not a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportFailurePolicy {
    /// Log it, count the page as having no tables, continue. (default)
    #[default]
    SkipPage,
    /// Abort the whole document.
    Abort,
}

/// Specifies which pages of the PDF to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Sorted, deduplicated 0-indexed page numbers within `total_pages`.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let in_range = |p: &usize| (1..=total_pages).contains(p);
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => std::iter::once(*p).filter(in_range).map(|p| p - 1).collect(),
            PageSelection::Range(start, end) => {
                ((*start).max(1)..=(*end).min(total_pages)).map(|p| p - 1).collect()
            }
            PageSelection::Set(pages) => pages.iter().copied().filter(in_range).map(|p| p - 1).collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
