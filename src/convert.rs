//! Document-level entry points.
//!
//! ```text
//! resolve source ─▶ render ─▶ encode ─▶ run_pages ─▶ ExtractionOutput
//!                                                        │
//!                                     extract_to_xlsx ───┴─▶ Workbook ─▶ .xlsx
//! ```
//!
//! Progress is reported at 10% once the run starts, 20% when page images
//! are ready, per page in between, and 100% on success. On failure the
//! callback receives the last percentage again with the error message.

use crate::config::ExtractionConfig;
use crate::error::{PageError, Pdf2XlsxError};
use crate::output::{ExtractionOutput, ExtractionStats, PageReport};
use crate::pipeline::encode::{encode_page, PageImage};
use crate::pipeline::extract::VisionTableExtractor;
use crate::pipeline::input;
use crate::pipeline::pages::run_pages;
use crate::pipeline::render::{render_pages, RenderOptions};
use crate::progress::{ProgressTracker, PERCENT_IMAGES_READY, PERCENT_START};
use crate::prompts::extraction_instruction;
use crate::workbook::{ExportMode, Workbook};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when the provider is Gemini and no model was named.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
/// Model used for any other named provider when no model was named.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Extract every table from a PDF file or URL.
///
/// Pages are processed one after another. Pages that fail recoverably are
/// reported in [`ExtractionOutput::pages`] and contribute no tables.
///
/// # Errors
/// Fatal failures only: unreadable input, a rejected API key, an aborting
/// page policy, cancellation, or no table found on any page.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2xlsx::{extract_tables, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().provider_name("gemini").build()?;
/// let output = extract_tables("invoice.pdf", &config).await?;
/// for table in &output.tables {
///     println!("{}: {} rows", table.table_name, table.rows.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_tables(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2XlsxError> {
    let progress = ProgressTracker::new(config.progress_callback.clone());
    let result = run(input_str.as_ref(), config, &progress).await;
    match &result {
        Ok(_) => progress.report("Extraction complete", 100),
        Err(e) => progress.report_failure(&e.to_string()),
    }
    result
}

async fn run(
    input_str: &str,
    config: &ExtractionConfig,
    progress: &ProgressTracker,
) -> Result<ExtractionOutput, Pdf2XlsxError> {
    let total_start = Instant::now();
    info!("Extracting tables from {}", input_str);
    progress.report("Reading document…", PERCENT_START);

    let source = input::resolve_source(input_str, config.download_timeout_secs).await?;
    let provider = resolve_provider(config)?;

    let render_start = Instant::now();
    let rendered = render_pages(
        source.path(),
        &RenderOptions {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pages: config.pages.clone(),
        },
    )
    .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let (images, encode_failures) = encode_all(&rendered.pages, config);
    info!(
        "Prepared {} page image(s) in {}ms",
        images.len(),
        render_duration_ms
    );
    progress.report("Page images ready", PERCENT_IMAGES_READY);

    let extractor = VisionTableExtractor::new(
        provider,
        extraction_instruction(config.instruction.as_deref()),
        config.temperature,
        config.max_tokens,
        Duration::from_secs(config.api_timeout_secs),
    );

    let extraction_start = Instant::now();
    let mut run_output = run_pages(&extractor, &images, &config.page_run_settings(), progress).await?;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    run_output.pages.extend(encode_failures);
    run_output.pages.sort_by_key(|p| p.page_num);

    let stats = ExtractionStats {
        total_pages: rendered.total_pages,
        processed_pages: images.len(),
        pages_with_tables: run_output.pages.iter().filter(|p| p.table_count > 0).count(),
        failed_pages: run_output.pages.iter().filter(|p| p.error.is_some()).count(),
        table_count: run_output.tables.len(),
        row_count: run_output.tables.iter().map(|t| t.row_count()).sum(),
        render_duration_ms,
        extraction_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Found {} table(s), {} row(s) on {}/{} page(s) in {}ms",
        stats.table_count,
        stats.row_count,
        stats.pages_with_tables,
        stats.processed_pages,
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        tables: run_output.tables,
        pages: run_output.pages,
        stats,
    })
}

/// Encode rendered pages; a page that fails to encode is reported, not fatal.
fn encode_all(
    rendered: &[(usize, image::DynamicImage)],
    config: &ExtractionConfig,
) -> (Vec<PageImage>, Vec<PageReport>) {
    let mut images = Vec::with_capacity(rendered.len());
    let mut failures = Vec::new();
    for (page_num, img) in rendered {
        match encode_page(*page_num, img, config.image_format) {
            Ok(page) => images.push(page),
            Err(e) => {
                warn!("Could not encode page {}: {}", page_num, e);
                failures.push(PageReport {
                    page_num: *page_num,
                    table_count: 0,
                    duration_ms: 0,
                    error: Some(PageError::EncodeFailed {
                        page: *page_num,
                        detail: e.to_string(),
                    }),
                });
            }
        }
    }
    (images, failures)
}

/// Extract tables and write them to an `.xlsx` workbook at `output_path`.
///
/// The file is written atomically; on any error nothing is left at
/// `output_path`.
pub async fn extract_to_xlsx(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    mode: ExportMode,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, Pdf2XlsxError> {
    let output = extract_tables(input_str, config).await?;
    let workbook = Workbook::assemble(&output.tables, mode);
    debug!("Workbook sheets: {:?}", workbook.sheet_names());
    workbook.save(output_path.as_ref()).await?;
    info!("Saved {}", output_path.as_ref().display());
    Ok(output.stats)
}

/// Blocking wrapper around [`extract_tables`] with its own runtime.
pub fn extract_tables_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2XlsxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2XlsxError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(extract_tables(input_str, config))
}

/// Extract tables from an in-memory PDF.
///
/// The bytes are spooled to a [`tempfile`] that is removed on return.
pub async fn extract_tables_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2XlsxError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| Pdf2XlsxError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Pdf2XlsxError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    extract_tables(&path, config).await
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2XlsxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2XlsxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: e.to_string(),
        }
    })
}

fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("gemini") {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_MODEL
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Pick the vision provider, most specific source first:
///
/// 1. a provider handle set on the config
/// 2. `provider_name` (+ `model`) from the config
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. Gemini, when `GEMINI_API_KEY` is set
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2XlsxError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for(name));
        debug!("Using provider {} with model {}", name, model);
        return create_vision_provider(name, model);
    }

    if let (Some(name), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        debug!("Using provider {} with model {} from environment", name, model);
        return create_vision_provider(&name, &model);
    }

    if non_empty_env("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| Pdf2XlsxError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No vision provider could be detected from the environment.\n\
Set GEMINI_API_KEY or OPENAI_API_KEY, or pass --provider.\n\
Error: {e}"
        ),
    })?;
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_gets_its_own_default_model() {
        assert_eq!(default_model_for("gemini"), DEFAULT_GEMINI_MODEL);
        assert_eq!(default_model_for("Gemini"), DEFAULT_GEMINI_MODEL);
        assert_eq!(default_model_for("openai"), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_provider_lookup() {
        let config = ExtractionConfig::default();
        let err = extract_tables("/no/such/file.pdf", &config).await.unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn bytes_without_signature_are_rejected() {
        let config = ExtractionConfig::default();
        let err = extract_tables_from_bytes(b"hello world", &config).await.unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NotAPdf { .. }));
    }
}
