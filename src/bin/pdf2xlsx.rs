//! CLI binary for edgequake-pdf2xlsx.
//!
//! Maps flags to `ExtractionConfig`, runs the extraction and writes the
//! workbook (or prints the result as JSON).

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2xlsx::{
    extract_tables, suggested_filename, ExportMode, ExtractionConfig, ExtractionProgressCallback,
    MalformedResponsePolicy, PageImageFormat, PageSelection, ProgressCallback, TransportFailurePolicy, Workbook,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── Progress bar ─────────────────────────────────────────────────────────────

/// Percentage bar driven by `on_progress`, with one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn page_elapsed(&self) -> String {
        let secs = self
            .page_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_progress(&self, message: &str, percent: u8) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        if let Ok(mut g) = self.page_started.lock() {
            *g = Some(Instant::now());
        }
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, table_count: usize) {
        let mark = if table_count > 0 { green("✓") } else { dim("·") };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            mark,
            page_num,
            total_pages,
            dim(&format!("{table_count} table(s)")),
            self.page_elapsed(),
        ));
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            self.page_elapsed(),
        ));
    }
}

/// Conventional exit status after SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

const AFTER_HELP: &str = r#"EXAMPLES:
  # One sheet per table → statement_ocr.xlsx
  pdf2xlsx statement.pdf

  # Everything on one sheet
  pdf2xlsx --merge statement.pdf -o all_rows.xlsx

  # Selected pages, slower pacing for a free-tier key
  pdf2xlsx --pages 2-6 --page-delay-ms 4000 report.pdf

  # Inspect the extracted tables instead of writing a workbook
  pdf2xlsx --json invoice.pdf > tables.json

  # From a URL, with an explicit model
  pdf2xlsx --provider gemini --model gemini-2.5-pro https://example.com/annual-report.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when present)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Provider override (used together with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Model override
  PDFIUM_LIB_PATH         libpdfium file, or the directory containing it
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract tables from PDF files into Excel workbooks using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Extract tables from PDF files and URLs into Excel workbooks using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Workbook path. Defaults to <name>_ocr.xlsx (or <name>_merged_ocr.xlsx).
    #[arg(short, long, env = "PDF2XLSX_OUTPUT")]
    output: Option<PathBuf>,

    /// Put every table on a single "Combined Data" sheet.
    #[arg(long, env = "PDF2XLSX_MERGE")]
    merge: bool,

    /// Vision model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "PDF2XLSX_MODEL")]
    model: Option<String>,

    /// Provider: gemini, openai, anthropic, azure, ollama, …
    #[arg(long, env = "PDF2XLSX_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2XLSX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Page image format sent to the model.
    #[arg(long, env = "PDF2XLSX_IMAGE_FORMAT", value_enum, default_value = "jpeg")]
    image_format: ImageFormatArg,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2XLSX_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2XLSX_PASSWORD")]
    password: Option<String>,

    /// Text file replacing the built-in extraction instruction.
    #[arg(long, env = "PDF2XLSX_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Attempts per page when the service is rate limiting.
    #[arg(long, env = "PDF2XLSX_MAX_ATTEMPTS", default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_attempts: u32,

    /// First backoff delay in milliseconds; doubles on each retry.
    #[arg(long, env = "PDF2XLSX_RETRY_BASE_MS", default_value_t = 2000)]
    retry_base_ms: u64,

    /// Pause between consecutive pages in milliseconds.
    #[arg(long, env = "PDF2XLSX_PAGE_DELAY_MS", default_value_t = 1500)]
    page_delay_ms: u64,

    /// Abort the document when the model returns unparseable JSON.
    #[arg(long, env = "PDF2XLSX_STRICT_JSON")]
    strict_json: bool,

    /// Abort the document on network failures instead of skipping the page.
    #[arg(long, env = "PDF2XLSX_ABORT_ON_TRANSPORT_ERROR")]
    abort_on_transport_error: bool,

    /// Print the extracted tables as JSON instead of writing a workbook.
    #[arg(long, env = "PDF2XLSX_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2XLSX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-request timeout for the vision service in seconds.
    #[arg(long, env = "PDF2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Enable DEBUG-level logs.
    #[arg(short, long, env = "PDF2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2XLSX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Jpeg,
    Png,
}

impl From<ImageFormatArg> for PageImageFormat {
    fn from(v: ImageFormatArg) -> Self {
        match v {
            ImageFormatArg::Jpeg => PageImageFormat::Jpeg,
            ImageFormatArg::Png => PageImageFormat::Png,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar covers normal feedback; library logs only show with -v.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Ctrl-C → cancel the run; a second Ctrl-C exits at once ──────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Cancelling… (Ctrl-C again to quit)", yellow("■"));
                cancel.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        });
    }

    let progress_cb = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress_cb.clone().map(|cb| cb as ProgressCallback),
        cancel,
    )
    .await?;

    let result = extract_tables(&cli.input, &config).await;
    if let Some(cb) = &progress_cb {
        cb.bar.finish_and_clear();
    }
    let output = result.context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    let mode = if cli.merge {
        ExportMode::MergeAll
    } else {
        ExportMode::SeparateSheets
    };
    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(suggested_filename(&cli.input, mode)));

    let workbook = Workbook::assemble(&output.tables, mode);
    workbook
        .save(&path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} table(s), {} row(s) from {}/{} page(s)  {}ms  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            stats.table_count,
            stats.row_count,
            stats.pages_with_tables,
            stats.processed_pages,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
        eprintln!("   {} {}", dim("sheets:"), workbook.sheet_names().join(", "));
        if stats.failed_pages > 0 {
            eprintln!("   {} page(s) skipped:", yellow(&stats.failed_pages.to_string()));
            for err in output.page_errors() {
                eprintln!("     {}", dim(&err.to_string()));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .image_format(cli.image_format.into())
        .pages(parse_pages(&cli.pages)?)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_base_ms)
        // Jitter may not exceed the base delay.
        .retry_max_jitter_ms(cli.retry_base_ms.min(1000))
        .page_delay_ms(cli.page_delay_ms)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .cancel_token(cancel);

    if cli.strict_json {
        builder = builder.malformed_response(MalformedResponsePolicy::Abort);
    }
    if cli.abort_on_transport_error {
        builder = builder.transport_failure(TransportFailurePolicy::Abort);
    }
    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = &cli.password {
        builder = builder.password(password);
    }
    if let Some(path) = &cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {}", path.display()))?;
        builder = builder.instruction(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` into a `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page_number = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {n})");
        }
        Ok(n)
    };

    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page_number(start)?, page_number(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{start}-{end}': start must be <= end");
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages = s.split(',').map(page_number).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    Ok(PageSelection::Single(page_number(s.as_str())?))
}
