//! Error types for the halfpage-json library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`PipelineError`]: the run cannot start (missing credential, no input,
//!   unreadable prompt) or a single document cannot be split. Run-level
//!   variants are returned from [`crate::run::run`]; document-level variants
//!   are recorded in [`crate::output::DocumentOutcome::Failed`] and the batch
//!   carries on with the other documents.
//!
//! * [`UnitError`]: one half-page unit failed (OCR exit status, no HTML
//!   produced, model call, write). Stored inside
//!   [`crate::output::ProcessingOutcome::Failure`] next to the unit label so
//!   sibling units are never affected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal and document-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Neither a single document nor an input directory was configured.
    #[error("No input selected.\nSet PDF_INPUT or PDF_INPUT_DIR, or pass --pdf / --pdf-dir.")]
    InputNotSelected,

    /// The input directory exists but holds no PDF documents.
    #[error("No PDFs in '{dir}'")]
    NoDocuments { dir: PathBuf },

    /// The prompt file could not be read.
    #[error("Failed to read prompt '{path}': {source}")]
    PromptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model credential is absent or empty.
    #[error("{var} must be set (environment or .env file)")]
    MissingCredential { var: &'static str },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The model client could not be constructed.
    #[error("Failed to initialise model client: {0}")]
    ModelClientInit(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library in the working directory."
    )]
    PdfiumBindingFailed(String),

    // ── Document errors ───────────────────────────────────────────────────
    /// The document could not be opened by pdfium.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page has no usable width or height, so it cannot be halved.
    #[error("Page {page} of '{path}' has invalid geometry ({width}x{height} pt)")]
    InvalidPageGeometry {
        path: PathBuf,
        page: usize,
        width: f32,
        height: f32,
    },

    /// Building or saving a half-page document failed.
    #[error("Splitting page {page} of '{path}' failed: {detail}")]
    SplitFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// pdfium could not rasterise a half-page document.
    #[error("Rasterisation failed for '{path}': {detail}")]
    RasterisationFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create an output directory or file.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single half-page unit.
///
/// The owning unit's label is kept alongside it in
/// [`crate::output::ProcessingOutcome::Failure`].
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum UnitError {
    /// The unit's working directory could not be created.
    #[error("could not create '{path}': {detail}")]
    OutputDirFailed { path: PathBuf, detail: String },

    /// The OCR command could not be started or exited non-zero.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// The OCR command succeeded but left no HTML behind.
    #[error("No OCR HTML in '{dir}'")]
    NoOutputFound { dir: PathBuf },

    /// Upload, generation or the HTTP transport failed.
    #[error("model call failed: {detail}")]
    ModelCallFailed { detail: String },

    /// The reconciled JSON could not be written.
    #[error("failed to write '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    /// The unit's task panicked.
    #[error("unit task panicked: {detail}")]
    Panicked { detail: String },
}
