//! Outcome types recorded by the schedulers.
//!
//! Nothing here is written to disk by the pipeline itself; the JSON result
//! files are the artifacts. These types let a caller (the CLI, a test, a
//! host application) see what happened to every document and unit.

use crate::document::Document;
use crate::error::{PipelineError, UnitError};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result of processing one half-page unit.
#[derive(Debug, Clone, Serialize)]
pub enum ProcessingOutcome {
    /// The JSON file was written at `path`.
    Success { label: String, path: PathBuf },
    /// The unit failed; siblings are unaffected.
    Failure { label: String, error: UnitError },
}

impl ProcessingOutcome {
    /// Unit label, e.g. `p01_l`.
    pub fn label(&self) -> &str {
        match self {
            ProcessingOutcome::Success { label, .. } | ProcessingOutcome::Failure { label, .. } => {
                label
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    /// Written file, for successful units.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ProcessingOutcome::Success { path, .. } => Some(path),
            ProcessingOutcome::Failure { .. } => None,
        }
    }
}

/// Every unit outcome of a document that was split successfully.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub document: Document,
    /// Sorted by unit label.
    pub outcomes: Vec<ProcessingOutcome>,
}

impl DocumentReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// What happened to one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    /// The document was split; individual units may still have failed.
    Completed(DocumentReport),
    /// The document failed before any unit could run.
    Failed {
        document: Document,
        error: PipelineError,
    },
}

impl DocumentOutcome {
    pub fn document(&self) -> &Document {
        match self {
            DocumentOutcome::Completed(report) => &report.document,
            DocumentOutcome::Failed { document, .. } => document,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Sorted by document path.
    pub documents: Vec<DocumentOutcome>,
    /// Wall-clock duration of the batch.
    pub duration_ms: u64,
}

impl BatchReport {
    /// Units whose JSON file was written.
    pub fn succeeded_units(&self) -> usize {
        self.reports().map(DocumentReport::succeeded).sum()
    }

    /// Units that failed inside completed documents.
    pub fn failed_units(&self) -> usize {
        self.reports().map(DocumentReport::failed).sum()
    }

    /// Documents that failed as a whole.
    pub fn failed_documents(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d, DocumentOutcome::Failed { .. }))
            .count()
    }

    /// `true` when every document was split and every unit succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed_documents() == 0 && self.failed_units() == 0
    }

    fn reports(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter_map(|d| match d {
            DocumentOutcome::Completed(report) => Some(report),
            DocumentOutcome::Failed { .. } => None,
        })
    }
}
