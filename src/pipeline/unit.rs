//! Unit processor: OCR → model → reconcile → write, for one half-page unit.
//!
//! Every step depends on the previous one succeeding. The processor never
//! returns an error: any failure becomes a labelled
//! [`ProcessingOutcome::Failure`] so sibling units keep running.

use crate::document::{Document, HalfPageUnit};
use crate::error::UnitError;
use crate::output::ProcessingOutcome;
use crate::pipeline::model::ModelClient;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::reconcile::reconcile;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process one unit and record what happened.
pub async fn process_unit(
    unit: &HalfPageUnit,
    document: &Document,
    output_dir: &Path,
    prompt: &str,
    ocr: &dyn OcrEngine,
    model: &dyn ModelClient,
) -> ProcessingOutcome {
    let label = unit.label();
    let start = Instant::now();

    match run_steps(unit, document, output_dir, prompt, ocr, model).await {
        Ok(path) => {
            info!(
                "✓ {} {} → {} ({}ms)",
                document.file_name(),
                label,
                path.display(),
                start.elapsed().as_millis()
            );
            ProcessingOutcome::Success { label, path }
        }
        Err(error) => {
            warn!("✗ {} {}: {}", document.file_name(), label, error);
            ProcessingOutcome::Failure { label, error }
        }
    }
}

async fn run_steps(
    unit: &HalfPageUnit,
    document: &Document,
    output_dir: &Path,
    prompt: &str,
    ocr: &dyn OcrEngine,
    model: &dyn ModelClient,
) -> Result<PathBuf, UnitError> {
    let unit_dir = document.unit_dir(output_dir, unit);
    tokio::fs::create_dir_all(&unit_dir)
        .await
        .map_err(|e| UnitError::OutputDirFailed {
            path: unit_dir.clone(),
            detail: e.to_string(),
        })?;

    let html = ocr.run(&unit.image_path, &unit_dir).await?;
    debug!("{}: OCR output {}", unit.label(), html.display());

    let answer = model
        .generate(prompt, &unit.document_path, &html)
        .await
        .map_err(|e| UnitError::ModelCallFailed {
            detail: e.to_string(),
        })?;

    let tag = document.provenance_tag();
    let reconciled = reconcile(&answer, Some(&tag));
    if !reconciled.is_parsed() {
        debug!("{}: no JSON recovered, keeping raw text", unit.label());
    }

    let target = document.json_target(output_dir, unit);
    write_atomic(&target, reconciled.to_file_contents().as_bytes()).await?;
    Ok(target)
}

/// Write to a temporary sibling, then rename over `path`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UnitError> {
    let write_err = |e: std::io::Error| UnitError::WriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
