//! Pipeline stages for half-page JSON extraction.
//!
//! Each submodule implements one step. The external collaborators (pdfium,
//! the OCR command, the model API) sit behind small traits so the schedulers
//! in [`crate::schedule`] can be driven with fakes in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ ocr ──▶ model ──▶ reconcile ──▶ file
//! (scan)   (pdfium)  (cmd)   (HTTP)    (pure)
//!                   └──────────── unit ───────────────┘
//! ```
//!
//! 1. [`input`]:     resolve a single file or a directory into documents
//! 2. [`split`]:     halve every page and rasterise each half; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`ocr`]:       run the OCR command on one half-page image
//! 4. [`model`]:     upload both documents, generate, delete the uploads
//! 5. [`reconcile`]: recover JSON from free-form text and stamp provenance
//! 6. [`unit`]:      steps 3–5 plus the atomic write, for one unit

pub mod input;
pub mod model;
pub mod ocr;
pub mod reconcile;
pub mod split;
pub mod unit;
