//! # halfpage-json
//!
//! Turn scanned two-column PDF documents into structured JSON, one file per
//! half page.
//!
//! Each page is cut down the middle. Every half is rasterised, run through
//! an external OCR command that produces HTML, and sent together with its
//! half-page PDF to a generative model, which answers in (usually) JSON.
//! The answer is reconciled into a JSON value, stamped with a provenance
//! tag taken from the document name, and written next to its siblings.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input_pdfs/*.pdf
//!  │
//!  ├─ 1. Input      single file or directory scan
//!  ├─ 2. Split      halve every page via pdfium (spawn_blocking)
//!  ├─ 3. OCR        external command → HTML            ┐
//!  ├─ 4. Model      upload PDF + HTML, generate, delete │ per half page,
//!  ├─ 5. Reconcile  recover JSON, put `year` first      │ bounded pool
//!  └─ 6. Write      {output}/{doc}/{stem}_p01_l.json   ┘
//! ```
//!
//! Documents run on an outer pool (`max_workers`) and the half pages of each
//! document on an inner pool (`max_page_workers`). A failing unit never
//! affects its siblings and a failing document never affects the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use halfpage_json::{run, InputSelection, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .input(InputSelection::Directory("input_pdfs".into()))
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let report = run(&config).await?;
//!     eprintln!(
//!         "{} written, {} failed",
//!         report.succeeded_units(),
//!         report.failed_units()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `halfpage` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! halfpage-json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;
pub mod schedule;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Device, InputSelection, PipelineConfig, PipelineConfigBuilder};
pub use document::{Document, HalfPageUnit, Side};
pub use error::{PipelineError, UnitError};
pub use output::{BatchReport, DocumentOutcome, DocumentReport, ProcessingOutcome};
pub use pipeline::model::{GeminiClient, ModelClient, ModelError};
pub use pipeline::ocr::{CommandOcr, OcrEngine};
pub use pipeline::reconcile::{reconcile, Reconciled};
pub use pipeline::split::{PageSplitter, PdfiumSplitter};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{run, run_blocking};
pub use schedule::Pipeline;
