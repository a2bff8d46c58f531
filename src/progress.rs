//! Progress-callback trait for per-image OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events as
//! the pipeline sends each page or region to the model. The CLI uses it to
//! drive its progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use specsheet_ocr::{OcrConfig, OcrProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl OcrProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, filename: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}/{total} {filename} (#{index})");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = OcrConfig::builder()
//!     .progress_callback(cb as Arc<dyn OcrProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the OCR pipeline as it processes each image.
///
/// With `concurrency > 1` the per-item methods may be called concurrently
/// from different tasks, so implementations must be `Send + Sync`. All
/// methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once the number of images to send is known.
    fn on_run_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before the request for an image is sent.
    ///
    /// `index` is the 0-based position of the image in the result set.
    fn on_item_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a response arrived (parsed or not).
    fn on_item_complete(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when the request for an image failed.
    fn on_item_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    /// Called once after every image has been attempted.
    ///
    /// `answered` counts images that got a response, parsed or not.
    fn on_run_complete(&self, total_items: usize, answered: usize) {
        let _ = (total_items, answered);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        answered: AtomicUsize,
    }

    impl OcrProgressCallback for TrackingCallback {
        fn on_item_start(&self, _index: usize, _total: usize, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _filename: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _filename: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total_items: usize, answered: usize) {
            self.answered.store(answered, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_item_start(0, 2, "page_1_part_1.png");
        cb.on_item_complete(0, 2, "page_1_part_1.png");
        cb.on_item_error(1, 2, "page_1_part_2.png", "HTTP 500");
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_item_start(0, 2, "a.png");
        tracker.on_item_complete(0, 2, "a.png");
        tracker.on_item_start(1, 2, "b.png");
        tracker.on_item_error(1, 2, "b.png", "timeout");
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.answered.load(Ordering::SeqCst), 1);
    }
}
