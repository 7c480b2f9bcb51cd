//! Progress-callback trait for per-document and per-unit events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the schedulers work through the batch. The CLI uses it to draw
//! a progress bar and print one status line per unit.
//!
//! # Example
//!
//! ```rust
//! use halfpage_json::{PipelineConfig, PipelineProgressCallback, Document};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, document: &Document, label: &str, path: &Path) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} {} -> {}", document.file_name(), label, path.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::document::Document;
use crate::error::{PipelineError, UnitError};
use crate::output::BatchReport;
use std::path::Path;
use std::sync::Arc;

/// Called by the schedulers as documents and units finish.
///
/// Units of one document, and documents of one batch, run concurrently, so
/// every method except `on_batch_start` / `on_batch_complete` may be called
/// from several threads at once. Protect shared state accordingly.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once after input discovery, before any document is split.
    fn on_batch_start(&self, documents: usize) {
        let _ = documents;
    }

    /// Called after a document was split into `units` half-page units.
    fn on_document_start(&self, document: &Document, units: usize) {
        let _ = (document, units);
    }

    /// Called when a unit's JSON file was written.
    fn on_unit_complete(&self, document: &Document, label: &str, path: &Path) {
        let _ = (document, label, path);
    }

    /// Called when a unit failed.
    fn on_unit_error(&self, document: &Document, label: &str, error: &UnitError) {
        let _ = (document, label, error);
    }

    /// Called when a whole document failed (split error or panic).
    fn on_document_error(&self, document: &Document, error: &PipelineError) {
        let _ = (document, error);
    }

    /// Called once with the final report.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// Does nothing. Used when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
