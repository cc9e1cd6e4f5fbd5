//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events while the pipeline works through the document. Events are
//! advisory: a callback cannot stop or alter the run.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2xlsx::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_progress(&self, message: &str, percent: u8) {
//!         eprintln!("[{percent:>3}%] {message}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Called by the pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Status line and overall completion (0–100, never decreasing within a run).
    fn on_progress(&self, message: &str, percent: u8) {
        let _ = (message, percent);
    }

    /// Called just before the extraction request is sent for a page.
    ///
    /// * `page_num`    — 1-indexed position in the selected pages
    /// * `total_pages` — number of selected pages
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page was extracted (possibly with zero tables).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, table_count: usize) {
        let _ = (page_num, total_pages, table_count);
    }

    /// Called when a page failed recoverably and was skipped.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Percent reported when the run starts.
pub const PERCENT_START: u8 = 10;
/// Percent reported once page images are ready.
pub const PERCENT_IMAGES_READY: u8 = 20;
/// Share of the bar spent on per-page extraction.
const PAGES_SPAN: usize = 75;

/// Percent reported before page `index` (0-based) of `total`.
pub fn page_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return PERCENT_IMAGES_READY;
    }
    PERCENT_IMAGES_READY + (index * PAGES_SPAN / total) as u8
}

/// Forwards events to an optional callback and keeps percentages monotonic.
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last_percent: AtomicU8,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_percent: AtomicU8::new(0),
        }
    }

    /// A tracker that reports nothing.
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Report `message` at `percent`, or at the last reported percent when
    /// `percent` would move the bar backwards.
    pub fn report(&self, message: &str, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        if let Some(cb) = &self.callback {
            cb.on_progress(message, percent.max(previous));
        }
    }

    /// Report a terminal failure without moving the bar.
    pub fn report_failure(&self, message: &str) {
        let percent = self.last_percent.load(Ordering::SeqCst);
        if let Some(cb) = &self.callback {
            cb.on_progress(message, percent);
        }
    }

    pub fn page_start(&self, page_num: usize, total_pages: usize) {
        if let Some(cb) = &self.callback {
            cb.on_page_start(page_num, total_pages);
        }
    }

    pub fn page_complete(&self, page_num: usize, total_pages: usize, table_count: usize) {
        if let Some(cb) = &self.callback {
            cb.on_page_complete(page_num, total_pages, table_count);
        }
    }

    pub fn page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        if let Some(cb) = &self.callback {
            cb.on_page_error(page_num, total_pages, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        percents: Mutex<Vec<u8>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_progress(&self, _message: &str, percent: u8) {
            self.percents.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_progress("start", 10);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 2);
        cb.on_page_error(2, 5, "some error");
    }

    #[test]
    fn page_percent_spans_20_to_95() {
        assert_eq!(page_percent(0, 4), 20);
        assert_eq!(page_percent(2, 4), 57);
        assert_eq!(page_percent(3, 4), 76);
        assert!(page_percent(99, 100) < 96);
    }

    #[test]
    fn tracker_never_moves_backwards() {
        let rec = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(Some(rec.clone() as ProgressCallback));
        tracker.report("start", 10);
        tracker.report("images", 20);
        tracker.report("page 1", 20);
        tracker.report("bogus", 5);
        tracker.report_failure("failed");
        tracker.report("done", 100);
        assert_eq!(*rec.percents.lock().unwrap(), vec![10, 20, 20, 20, 20, 100]);
    }

    #[test]
    fn silent_tracker_accepts_events() {
        let tracker = ProgressTracker::silent();
        tracker.report("x", 50);
        tracker.page_start(1, 1);
        tracker.page_error(1, 1, "e");
    }
}
