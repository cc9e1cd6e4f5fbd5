//! Page pipeline: drive extraction across every page of one document.
//!
//! Pages are processed strictly one after another. The vision service is
//! rate limited per caller, so the loop sleeps a fixed `page_delay` before
//! every page but the first, whatever happened on the previous one, and
//! wraps each call in [`retry_with_backoff`]. A cancellation cuts short the
//! pacing sleep or the page in flight, backoff included.
//!
//! ```text
//! Initializing ─▶ ProcessingPage(0) ─▶ … ─▶ ProcessingPage(n-1) ─▶ Aggregating
//!                        │                          │                 │
//!                        └──── fatal ──▶ Failed ◀───┘     empty ──────┤
//!                                                                     ▼
//!                                                                 Succeeded
//! ```
//!
//! Failure classification per page:
//!
//! | error                 | outcome                                  |
//! |-----------------------|------------------------------------------|
//! | invalid credentials   | abort the document                       |
//! | rate limit exhausted  | skip page                                |
//! | empty response        | skip page                                |
//! | malformed response    | skip page, or abort per policy           |
//! | transport failure     | skip page, or abort per policy           |

use crate::config::{MalformedResponsePolicy, TransportFailurePolicy};
use crate::error::{ExtractionError, PageError, Pdf2XlsxError};
use crate::output::PageReport;
use crate::pipeline::encode::PageImage;
use crate::pipeline::extract::TableExtractor;
use crate::pipeline::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::progress::{page_percent, ProgressTracker};
use crate::table::ExtractedTable;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Knobs for one run of [`run_pages`].
#[derive(Debug, Clone)]
pub struct PageRunSettings {
    pub retry: RetryPolicy,
    /// Pause before every page except the first.
    pub page_delay: Duration,
    pub malformed_response: MalformedResponsePolicy,
    pub transport_failure: TransportFailurePolicy,
    pub cancel: Option<CancellationToken>,
}

impl Default for PageRunSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_delay: Duration::from_millis(1500),
            malformed_response: MalformedResponsePolicy::default(),
            transport_failure: TransportFailurePolicy::default(),
            cancel: None,
        }
    }
}

/// Successful run: every table found, in page order, plus a report per page.
#[derive(Debug, Clone)]
pub struct PageRunOutput {
    pub tables: Vec<ExtractedTable>,
    pub pages: Vec<PageReport>,
}

/// Where a page failure lands.
enum Disposition {
    Skip(PageError),
    Abort(Pdf2XlsxError),
}

/// Extract tables from `pages` in order.
///
/// Returns the accumulated tables (never empty) or the first fatal error.
/// Zero tables across all pages is [`Pdf2XlsxError::NoTablesFound`].
pub async fn run_pages(
    extractor: &dyn TableExtractor,
    pages: &[PageImage],
    settings: &PageRunSettings,
    progress: &ProgressTracker,
) -> Result<PageRunOutput, Pdf2XlsxError> {
    let total = pages.len();
    let mut tables: Vec<ExtractedTable> = Vec::new();
    let mut reports: Vec<PageReport> = Vec::with_capacity(total);
    let mut rate_limited_pages = 0;

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            pace(settings, i, total).await?;
        }
        check_cancelled(settings, i, total)?;

        let position = i + 1;
        progress.report(
            &format!("Analysing page {}/{}…", position, total),
            page_percent(i, total),
        );
        progress.page_start(position, total);

        let start = Instant::now();
        let label = format!("Page {}", page.page_num);
        let attempt = retry_with_backoff(&settings.retry, &label, || extractor.extract(page));
        let result = match &settings.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    return Err(Pdf2XlsxError::Cancelled { completed: i, total });
                }
                result = attempt => result,
            },
            None => attempt.await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(found) => {
                debug!("Page {}: {} table(s)", page.page_num, found.len());
                progress.page_complete(position, total, found.len());
                reports.push(PageReport {
                    page_num: page.page_num,
                    table_count: found.len(),
                    duration_ms,
                    error: None,
                });
                tables.extend(found);
            }
            Err(err) => match classify(err, page.page_num, settings) {
                Disposition::Abort(fatal) => {
                    warn!("Page {}: fatal — {}", page.page_num, fatal);
                    progress.page_error(position, total, &fatal.to_string());
                    return Err(fatal);
                }
                Disposition::Skip(page_err) => {
                    warn!("Skipping page {}: {}", page.page_num, page_err);
                    if matches!(page_err, PageError::RateLimited { .. }) {
                        rate_limited_pages += 1;
                    }
                    progress.page_error(position, total, &page_err.to_string());
                    reports.push(PageReport {
                        page_num: page.page_num,
                        table_count: 0,
                        duration_ms,
                        error: Some(page_err),
                    });
                }
            },
        }
    }

    if tables.is_empty() {
        return Err(Pdf2XlsxError::NoTablesFound {
            pages: total,
            rate_limited_pages,
        });
    }

    info!("Extracted {} table(s) from {} page(s)", tables.len(), total);
    Ok(PageRunOutput {
        tables,
        pages: reports,
    })
}

/// Sleep the pacing delay; a cancellation cuts it short.
async fn pace(settings: &PageRunSettings, completed: usize, total: usize) -> Result<(), Pdf2XlsxError> {
    match &settings.cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(Pdf2XlsxError::Cancelled { completed, total }),
            _ = tokio::time::sleep(settings.page_delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(settings.page_delay).await;
            Ok(())
        }
    }
}

fn check_cancelled(settings: &PageRunSettings, completed: usize, total: usize) -> Result<(), Pdf2XlsxError> {
    match &settings.cancel {
        Some(token) if token.is_cancelled() => Err(Pdf2XlsxError::Cancelled { completed, total }),
        _ => Ok(()),
    }
}

fn classify(err: RetryError<ExtractionError>, page: usize, settings: &PageRunSettings) -> Disposition {
    let attempts = err.attempts();
    let inner = err.into_inner();
    match inner {
        ExtractionError::InvalidCredentials(detail) => {
            Disposition::Abort(Pdf2XlsxError::InvalidCredentials { page, detail })
        }
        ExtractionError::MalformedResponse(detail)
            if settings.malformed_response == MalformedResponsePolicy::Abort =>
        {
            Disposition::Abort(Pdf2XlsxError::ExtractionAborted {
                page,
                detail: format!("malformed response: {detail}"),
            })
        }
        ExtractionError::Transport(detail)
            if settings.transport_failure == TransportFailurePolicy::Abort =>
        {
            Disposition::Abort(Pdf2XlsxError::ExtractionAborted { page, detail })
        }
        other => Disposition::Skip(other.into_page_error(page, attempts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    struct Fixed(Result<Vec<ExtractedTable>, ExtractionError>);

    impl TableExtractor for Fixed {
        fn extract<'a>(
            &'a self,
            _page: &'a PageImage,
        ) -> BoxFuture<'a, Result<Vec<ExtractedTable>, ExtractionError>> {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    fn settings() -> PageRunSettings {
        PageRunSettings {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(100),
                max_jitter: Duration::ZERO,
            },
            page_delay: Duration::from_millis(10),
            ..PageRunSettings::default()
        }
    }

    fn page(n: usize) -> PageImage {
        PageImage::new(n, "image/jpeg", "AAAA")
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_is_skipped_by_default() {
        let ex = Fixed(Err(ExtractionError::MalformedResponse("eof".into())));
        let err = run_pages(&ex, &[page(1)], &settings(), &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoTablesFound { pages: 1, rate_limited_pages: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_aborts_when_configured() {
        let ex = Fixed(Err(ExtractionError::MalformedResponse("eof".into())));
        let mut s = settings();
        s.malformed_response = MalformedResponsePolicy::Abort;
        let err = run_pages(&ex, &[page(1), page(2)], &s, &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::ExtractionAborted { page: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_aborts_when_configured() {
        let ex = Fixed(Err(ExtractionError::Transport("dns".into())));
        let mut s = settings();
        s.transport_failure = TransportFailurePolicy::Abort;
        let err = run_pages(&ex, &[page(4)], &s, &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::ExtractionAborted { page: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_is_counted_in_failure() {
        let ex = Fixed(Err(ExtractionError::RateLimited("429".into())));
        let err = run_pages(&ex, &[page(1)], &settings(), &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoTablesFound { rate_limited_pages: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn no_pages_is_no_tables() {
        let ex = Fixed(Ok(vec![]));
        let err = run_pages(&ex, &[], &settings(), &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoTablesFound { pages: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_next_page() {
        let table = ExtractedTable::from_positional("T", vec!["A".into()], &[vec!["1"]]);
        let ex = Fixed(Ok(vec![table]));
        let token = CancellationToken::new();
        token.cancel();
        let mut s = settings();
        s.cancel = Some(token);
        let err = run_pages(&ex, &[page(1), page(2)], &s, &ProgressTracker::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::Cancelled { completed: 0, total: 2 }));
    }
}
