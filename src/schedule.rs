//! Document and batch schedulers.
//!
//! Two bounded pools form a two-level fan-out:
//!
//! ```text
//! process_batch ── buffer_unordered(max_workers) ──▶ process_document
//!                                                      │ split
//!                   buffer_unordered(max_page_workers) ▼
//!                                                    process_unit × N
//! ```
//!
//! At most `max_workers * max_page_workers` units are in flight at once.
//! Every task is spawned onto the runtime only when its pool admits it, so
//! a panicking unit or document surfaces as a `JoinError` at the scheduler
//! and is recorded as a failure. Nothing unwinds past [`Pipeline::process_batch`].

use crate::config::PipelineConfig;
use crate::document::{Document, HalfPageUnit};
use crate::error::{PipelineError, UnitError};
use crate::output::{BatchReport, DocumentOutcome, DocumentReport, ProcessingOutcome};
use crate::pipeline::model::ModelClient;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::split::PageSplitter;
use crate::pipeline::unit;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{error, info};

/// Everything a run shares across tasks: read-only config, prompt text and
/// the three collaborators. Cloning is cheap.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    prompt: Arc<str>,
    splitter: Arc<dyn PageSplitter>,
    ocr: Arc<dyn OcrEngine>,
    model: Arc<dyn ModelClient>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        prompt: impl Into<Arc<str>>,
        splitter: Arc<dyn PageSplitter>,
        ocr: Arc<dyn OcrEngine>,
        model: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            prompt: prompt.into(),
            splitter,
            ocr,
            model,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    /// Run one unit. Never fails; see [`unit::process_unit`].
    pub async fn process_unit(&self, unit: &HalfPageUnit, document: &Document) -> ProcessingOutcome {
        unit::process_unit(
            unit,
            document,
            &self.config.output_dir,
            &self.prompt,
            self.ocr.as_ref(),
            self.model.as_ref(),
        )
        .await
    }

    /// Split one document and run its units on the inner pool.
    ///
    /// Returns `Err` only when splitting fails; unit failures are recorded
    /// in the report. Outcomes are ordered by page, LEFT before RIGHT.
    pub async fn process_document(
        &self,
        document: &Document,
    ) -> Result<DocumentReport, PipelineError> {
        let doc_dir = document.output_dir(&self.config.output_dir);
        let units = self.splitter.split(document, &doc_dir).await?;

        if let Some(cb) = self.progress() {
            cb.on_document_start(document, units.len());
        }

        let tasks: Vec<_> = units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| {
                let pipeline = self.clone();
                let document = document.clone();
                async move {
                    let label = unit.label();
                    let handle = tokio::spawn({
                        let pipeline = pipeline.clone();
                        let document = document.clone();
                        async move { pipeline.process_unit(&unit, &document).await }
                    });

                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("{} {}: unit task failed: {}", document.file_name(), label, e);
                            ProcessingOutcome::Failure {
                                label,
                                error: UnitError::Panicked {
                                    detail: join_error_detail(e),
                                },
                            }
                        }
                    };
                    pipeline.report_unit(&document, &outcome);
                    (index, outcome)
                }
            })
            .collect();

        let mut outcomes: Vec<(usize, ProcessingOutcome)> = stream::iter(tasks)
            .buffer_unordered(self.config.max_page_workers)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        let report = DocumentReport {
            document: document.clone(),
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        info!(
            "{}: {}/{} units written",
            document.file_name(),
            report.succeeded(),
            report.outcomes.len()
        );
        Ok(report)
    }

    /// Run every document on the outer pool and collect the report.
    ///
    /// Document failures are recorded, never propagated.
    pub async fn process_batch(&self, documents: Vec<Document>) -> BatchReport {
        let start = Instant::now();
        info!(
            "Processing {} document(s), {}×{} workers",
            documents.len(),
            self.config.max_workers,
            self.config.max_page_workers
        );
        if let Some(cb) = self.progress() {
            cb.on_batch_start(documents.len());
        }

        let tasks: Vec<_> = documents
            .into_iter()
            .map(|document| {
                let pipeline = self.clone();
                async move {
                    let handle = tokio::spawn({
                        let pipeline = pipeline.clone();
                        let document = document.clone();
                        async move { pipeline.process_document(&document).await }
                    });

                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(PipelineError::Internal(format!(
                            "document task failed: {}",
                            join_error_detail(e)
                        ))),
                    };

                    match result {
                        Ok(report) => DocumentOutcome::Completed(report),
                        Err(error) => {
                            error!("✗ {}: {}", document.file_name(), error);
                            if let Some(cb) = pipeline.progress() {
                                cb.on_document_error(&document, &error);
                            }
                            DocumentOutcome::Failed { document, error }
                        }
                    }
                }
            })
            .collect();

        let mut outcomes: Vec<DocumentOutcome> = stream::iter(tasks)
            .buffer_unordered(self.config.max_workers)
            .collect()
            .await;

        outcomes.sort_by(|a, b| a.document().path().cmp(b.document().path()));

        let report = BatchReport {
            documents: outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Batch complete: {} unit(s) written, {} unit(s) failed, {} document(s) failed, {}ms",
            report.succeeded_units(),
            report.failed_units(),
            report.failed_documents(),
            report.duration_ms
        );
        if let Some(cb) = self.progress() {
            cb.on_batch_complete(&report);
        }
        report
    }

    fn report_unit(&self, document: &Document, outcome: &ProcessingOutcome) {
        let Some(cb) = self.progress() else {
            return;
        };
        match outcome {
            ProcessingOutcome::Success { label, path } => cb.on_unit_complete(document, label, path),
            ProcessingOutcome::Failure { label, error } => cb.on_unit_error(document, label, error),
        }
    }
}

/// Panic payload text when available, else the join error itself.
fn join_error_detail(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panic_message_is_kept() {
        let err = tokio::spawn(async { panic!("split exploded") })
            .await
            .unwrap_err();
        assert_eq!(join_error_detail(err), "split exploded");
    }

    #[tokio::test]
    async fn formatted_panic_message_is_kept() {
        let page = 3;
        let err = tokio::spawn(async move { panic!("page {page} exploded") })
            .await
            .unwrap_err();
        assert_eq!(join_error_detail(err), "page 3 exploded");
    }
}
