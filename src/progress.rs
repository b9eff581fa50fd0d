//! Progress-callback trait for analysis events.
//!
//! Inject an [`Arc<dyn ProgressSink>`] into
//! [`crate::analyze::PaperAnalysisPipeline::run`] to receive events as the
//! pipeline moves through its stages and pages. The task coordinator maps
//! them onto task progress; the CLI drives a terminal progress bar with them.
//!
//! # Example
//!
//! ```rust
//! use paperlens::ProgressSink;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     done: AtomicUsize,
//! }
//!
//! impl ProgressSink for PageCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {}/{} analysed", page_num, total_pages);
//!     }
//! }
//!
//! let sink: Arc<dyn ProgressSink> = Arc::new(PageCounter { done: AtomicUsize::new(0) });
//! sink.on_page_complete(1, 3);
//! ```

use std::sync::Arc;

/// Pipeline stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Metadata,
    Rasterize,
    ExtractText,
    AnalyzePages,
    KeyInfo,
    Translate,
    Summary,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Metadata => "reading metadata",
            Stage::Rasterize => "rendering pages",
            Stage::ExtractText => "extracting text",
            Stage::AnalyzePages => "analysing pages",
            Stage::KeyInfo => "extracting key information",
            Stage::Translate => "translating key information",
            Stage::Summary => "writing summary",
        }
    }
}

/// Receives analysis events. Every method has a no-op default.
///
/// Pages are analysed sequentially, so page events for one run never
/// overlap, but a single sink may be shared by several runs.
pub trait ProgressSink: Send + Sync {
    /// A stage is about to start.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// The model call for a page is about to be sent.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// A page produced commentary.
    fn on_page_complete(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// A page's model call failed; the pipeline keeps going.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }
}

/// Sink that ignores every event.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Shared handle type used across the crate.
pub type SharedProgress = Arc<dyn ProgressSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ProgressSink for Recorder {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopProgress;
        sink.on_stage(Stage::Metadata);
        sink.on_page_start(1, 2);
        sink.on_page_complete(1, 2);
        sink.on_page_error(2, 2, "timeout");
    }

    #[test]
    fn recorder_receives_events() {
        let rec = Recorder::default();
        rec.on_stage(Stage::AnalyzePages);
        rec.on_page_complete(1, 2);
        rec.on_page_error(2, 2, "HTTP 500");
        rec.on_stage(Stage::Summary);

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![Stage::AnalyzePages, Stage::Summary]
        );
        assert_eq!(rec.completes.load(Ordering::SeqCst), 1);
        assert_eq!(rec.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Metadata < Stage::AnalyzePages);
        assert!(Stage::Translate < Stage::Summary);
        assert_eq!(Stage::KeyInfo.label(), "extracting key information");
    }
}
