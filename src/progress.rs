//! Progress-callback trait for run and per-document events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`]. The CLI uses
//! it to drive a progress bar; a service could forward events to a channel
//! or a job table instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docproc::{PipelineConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl RunProgressCallback for Counter {
//!     fn on_document_complete(&self, _index: usize, _total: usize, _id: &str, _status: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as documents move through the pipeline.
///
/// With `concurrency > 1` the per-document methods may be called from
/// several tasks at once, so implementations must synchronise shared state.
/// Every method defaults to a no-op.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    fn on_run_start(&self, run_id: &str, total_documents: usize) {
        let _ = (run_id, total_documents);
    }

    /// Called when a document leaves the queue.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in enqueue order
    fn on_document_start(&self, index: usize, total: usize, document_id: &str) {
        let _ = (index, total, document_id);
    }

    /// Called when a document reaches `done` or `done_with_validation_errors`.
    fn on_document_complete(&self, index: usize, total: usize, document_id: &str, status: &str) {
        let _ = (index, total, document_id, status);
    }

    /// Called when a document reaches a `failed:*` state.
    fn on_document_failed(&self, index: usize, total: usize, document_id: &str, error: &str) {
        let _ = (index, total, document_id, error);
    }

    /// Called once after every document has been attempted, or after an abort.
    fn on_run_complete(&self, run_id: &str, overall_status: &str, processed: usize) {
        let _ = (run_id, overall_status, processed);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
