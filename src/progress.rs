//! Progress-callback trait for per-file batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::queue::BatchQueue::submit_all`] to receive events as each file is
//! uploaded and converted. The CLI renders them as a progress bar; a GUI
//! could forward them to its own event loop.
//!
//! # Example
//!
//! ```rust
//! use office2pdf::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, _index: usize, total: usize, name: &str, pdf_size: u64) {
//!         let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total}: {name} ({pdf_size} bytes)");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the batch queue as it submits each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1` the per-file methods may be called concurrently.
/// Implementations must protect shared mutable state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file is sent.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file's upload request is sent.
    ///
    /// `index` is 1-based in submission order.
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when the server returned a converted PDF.
    fn on_file_complete(&self, index: usize, total: usize, name: &str, pdf_size: u64) {
        let _ = (index, total, name, pdf_size);
    }

    /// Called when a file failed or timed out. The batch continues.
    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopBatchCallback;

impl BatchProgressCallback for NoopBatchCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for Tracking {
        fn on_file_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _name: &str, _size: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopBatchCallback);
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, "a.docx");
        cb.on_file_complete(1, 2, "a.docx", 10);
        cb.on_file_error(2, 2, "b.docx", "timeout");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_batch_start(3);
        for i in 1..=3 {
            t.on_file_start(i, 3, "x.ppt");
        }
        t.on_file_complete(1, 3, "x.ppt", 1);
        t.on_file_complete(2, 3, "x.ppt", 1);
        t.on_file_error(3, 3, "x.ppt", "Error: 500");
        assert_eq!(t.starts.load(Ordering::SeqCst), 3);
        assert_eq!(t.completes.load(Ordering::SeqCst), 2);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }
}
