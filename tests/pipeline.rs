//! End-to-end tests of the page pipeline with a scripted extractor.
//!
//! No pdfium and no network: pages are fake images and every answer from
//! the "vision service" is scripted per page. Time is paused so backoff and
//! pacing delays complete instantly and can be measured exactly.

use edgequake_pdf2xlsx::pipeline::encode::PageImage;
use edgequake_pdf2xlsx::pipeline::retry::RetryPolicy;
use edgequake_pdf2xlsx::progress::ProgressTracker;
use edgequake_pdf2xlsx::{
    run_pages, ExportMode, ExtractedTable, ExtractionError, ExtractionProgressCallback, PageError,
    PageRunSettings, Pdf2XlsxError, ProgressCallback, TableExtractor, Workbook,
};
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Answer = Result<Vec<ExtractedTable>, ExtractionError>;

/// Replays scripted answers per page; unscripted pages yield no tables.
#[derive(Default)]
struct Scripted {
    answers: Mutex<HashMap<usize, VecDeque<Answer>>>,
    calls: Mutex<Vec<(usize, Instant)>>,
}

impl Scripted {
    fn answer(self, page: usize, answer: Answer) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(answer);
        self
    }

    fn called_pages(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

impl TableExtractor for Scripted {
    fn extract<'a>(&'a self, page: &'a PageImage) -> BoxFuture<'a, Answer> {
        Box::pin(async move {
            self.calls.lock().unwrap().push((page.page_num, Instant::now()));
            self.answers
                .lock()
                .unwrap()
                .get_mut(&page.page_num)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(vec![]))
        })
    }
}

/// Records every percentage and page hook.
#[derive(Default)]
struct Recorder {
    percents: Mutex<Vec<u8>>,
    started: Mutex<Vec<usize>>,
    completed: Mutex<Vec<(usize, usize)>>,
    errored: Mutex<Vec<usize>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_progress(&self, _message: &str, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }
    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.started.lock().unwrap().push(page_num);
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, table_count: usize) {
        self.completed.lock().unwrap().push((page_num, table_count));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.errored.lock().unwrap().push(page_num);
    }
}

fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> ExtractedTable {
    let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.to_vec()).collect();
    ExtractedTable::from_positional(name, headers.iter().map(|h| h.to_string()).collect(), &rows)
}

fn pages(n: usize) -> Vec<PageImage> {
    (1..=n).map(|i| PageImage::new(i, "image/jpeg", "AAAA")).collect()
}

fn settings() -> PageRunSettings {
    PageRunSettings {
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(2000),
            max_jitter: Duration::ZERO,
        },
        page_delay: Duration::from_millis(1500),
        ..PageRunSettings::default()
    }
}

/// The paused clock advances in whole milliseconds; allow one tick of slack.
fn assert_gap(earlier: Instant, later: Instant, ms: u64) {
    let gap = later - earlier;
    assert!(
        gap >= Duration::from_millis(ms) && gap <= Duration::from_millis(ms + 1),
        "expected ~{ms}ms, got {gap:?}"
    );
}

fn names(tables: &[ExtractedTable]) -> Vec<&str> {
    tables.iter().map(|t| t.table_name.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn tables_are_concatenated_in_page_order() {
    let ex = Scripted::default()
        .answer(1, Ok(vec![table("A", &["x"], &[&["1"]])]))
        .answer(2, Ok(vec![table("B", &["x"], &[]), table("C", &["x"], &[])]))
        .answer(3, Ok(vec![table("D", &["x"], &[])]));

    let out = run_pages(&ex, &pages(3), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    assert_eq!(names(&out.tables), vec!["A", "B", "C", "D"]);
    assert_eq!(out.pages.len(), 3);
    assert_eq!(out.pages[1].table_count, 2);
}

#[tokio::test(start_paused = true)]
async fn empty_pages_are_tolerated() {
    let ex = Scripted::default()
        .answer(1, Ok(vec![]))
        .answer(2, Ok(vec![table("Only", &["x"], &[&["1"]])]))
        .answer(3, Ok(vec![]));

    let out = run_pages(&ex, &pages(3), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    assert_eq!(names(&out.tables), vec!["Only"]);
    assert!(out.pages.iter().all(|p| p.error.is_none()));
}

#[tokio::test(start_paused = true)]
async fn no_tables_anywhere_is_an_error() {
    let ex = Scripted::default();
    let err = run_pages(&ex, &pages(4), &settings(), &ProgressTracker::silent())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Pdf2XlsxError::NoTablesFound {
            pages: 4,
            rate_limited_pages: 0
        }
    ));
    assert_eq!(ex.called_pages(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn invalid_credentials_stop_the_document() {
    let ex = Scripted::default()
        .answer(1, Ok(vec![table("A", &["x"], &[])]))
        .answer(2, Err(ExtractionError::InvalidCredentials("API key not valid".into())));

    let err = run_pages(&ex, &pages(5), &settings(), &ProgressTracker::silent())
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2XlsxError::InvalidCredentials { page: 2, .. }));
    assert_eq!(ex.called_pages(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn pacing_delay_only_between_pages() {
    let ex = Scripted::default().answer(1, Ok(vec![table("A", &["x"], &[])]));
    let start = Instant::now();

    run_pages(&ex, &pages(3), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    let times = ex.call_times();
    assert_eq!(times.len(), 3);
    assert_gap(start, times[0], 0);
    assert_gap(times[0], times[1], 1500);
    assert_gap(times[1], times[2], 1500);
    // Nothing after the last page.
    assert_gap(times[2], Instant::now(), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_page_backs_off_then_succeeds() {
    let ex = Scripted::default()
        .answer(1, Err(ExtractionError::RateLimited("429 Too Many Requests".into())))
        .answer(1, Err(ExtractionError::RateLimited("RESOURCE_EXHAUSTED".into())))
        .answer(1, Ok(vec![table("Recovered", &["x"], &[])]));

    let out = run_pages(&ex, &pages(1), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    assert_eq!(names(&out.tables), vec!["Recovered"]);
    let times = ex.call_times();
    assert_eq!(times.len(), 3);
    assert_gap(times[0], times[1], 2000);
    assert_gap(times[1], times[2], 4000);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_exhaustion_skips_only_that_page() {
    let mut ex = Scripted::default();
    for _ in 0..4 {
        ex = ex.answer(1, Err(ExtractionError::RateLimited("429".into())));
    }
    let ex = ex.answer(2, Ok(vec![table("Second", &["x"], &[])]));

    let out = run_pages(&ex, &pages(2), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    assert_eq!(names(&out.tables), vec!["Second"]);
    assert_eq!(ex.called_pages(), vec![1, 1, 1, 1, 2]);
    assert!(matches!(
        out.pages[0].error,
        Some(PageError::RateLimited { page: 1, attempts: 4, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn empty_and_malformed_answers_are_not_retried() {
    let ex = Scripted::default()
        .answer(1, Err(ExtractionError::EmptyResponse))
        .answer(2, Err(ExtractionError::MalformedResponse("expected value".into())))
        .answer(3, Ok(vec![table("Good", &["x"], &[])]));

    let out = run_pages(&ex, &pages(3), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    assert_eq!(ex.called_pages(), vec![1, 2, 3]);
    assert!(matches!(out.pages[0].error, Some(PageError::EmptyResponse { page: 1 })));
    assert!(matches!(out.pages[1].error, Some(PageError::MalformedResponse { page: 2, .. })));
}

#[tokio::test(start_paused = true)]
async fn progress_never_moves_backwards() {
    let recorder = Arc::new(Recorder::default());
    let tracker = ProgressTracker::new(Some(recorder.clone() as ProgressCallback));
    let ex = Scripted::default()
        .answer(2, Err(ExtractionError::EmptyResponse))
        .answer(4, Ok(vec![table("T", &["x"], &[])]));

    tracker.report("start", 10);
    tracker.report("images", 20);
    run_pages(&ex, &pages(4), &settings(), &tracker).await.unwrap();
    tracker.report("done", 100);

    let percents = recorder.percents.lock().unwrap().clone();
    assert_eq!(percents, vec![10, 20, 20, 38, 57, 76, 100]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*recorder.started.lock().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(*recorder.completed.lock().unwrap(), vec![(1, 0), (3, 0), (4, 1)]);
    assert_eq!(*recorder.errored.lock().unwrap(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_pacing_stops_the_run() {
    let token = tokio_util::sync::CancellationToken::new();
    let mut s = settings();
    s.cancel = Some(token.clone());

    let ex = Scripted::default().answer(1, Ok(vec![table("A", &["x"], &[])]));
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        })
    };

    let err = run_pages(&ex, &pages(3), &s, &ProgressTracker::silent())
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Pdf2XlsxError::Cancelled { completed: 1, total: 3 }));
    assert_eq!(ex.called_pages(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_the_run() {
    let token = tokio_util::sync::CancellationToken::new();
    let mut s = settings();
    s.cancel = Some(token.clone());

    let mut ex = Scripted::default();
    for _ in 0..4 {
        ex = ex.answer(1, Err(ExtractionError::RateLimited("429".into())));
    }
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            // Inside the second backoff wait (2000ms + 4000ms).
            tokio::time::sleep(Duration::from_millis(3000)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let err = run_pages(&ex, &pages(2), &s, &ProgressTracker::silent())
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Pdf2XlsxError::Cancelled { completed: 0, total: 2 }), "got {err:?}");
    assert_eq!(ex.called_pages(), vec![1, 1]);
    assert_gap(start, Instant::now(), 3000);
}

#[tokio::test(start_paused = true)]
async fn extracted_tables_become_a_workbook() {
    let ex = Scripted::default()
        .answer(1, Ok(vec![table("Report", &["A", "B"], &[&["1", "2"]])]))
        .answer(2, Ok(vec![table("Report", &["B", "C"], &[&["3", "4"]])]));

    let out = run_pages(&ex, &pages(2), &settings(), &ProgressTracker::silent())
        .await
        .unwrap();

    let separate = Workbook::assemble(&out.tables, ExportMode::SeparateSheets);
    assert_eq!(separate.sheet_names(), vec!["Report", "Report_1"]);

    let merged = Workbook::assemble(&out.tables, ExportMode::MergeAll);
    assert_eq!(merged.sheets[0].columns, vec!["A", "B", "C"]);
    assert_eq!(merged.sheets[0].rows, vec![vec!["1", "2", ""], vec!["", "3", "4"]]);

    let bytes = merged.to_bytes().unwrap();
    assert_eq!(&bytes[..2], b"PK");
}
