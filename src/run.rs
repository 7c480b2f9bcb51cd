//! Top-level entry points.
//!
//! [`run`] checks every run-level precondition before any expensive work:
//! input discovery, credential, output root, prompt. Only then are the
//! collaborators built (pdfium binding is checked here) and the batch scheduled.
//! A returned `Err` means the run never started; once the batch is
//! scheduled, failures are recorded in the [`BatchReport`] instead.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::BatchReport;
use crate::pipeline::input::discover_documents;
use crate::pipeline::model::GeminiClient;
use crate::pipeline::ocr::CommandOcr;
use crate::pipeline::split::PdfiumSplitter;
use crate::schedule::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the model credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Process every configured document.
///
/// # Errors
/// Returns `Err(PipelineError)` only for run-level failures:
/// - no input selected, input missing, or a directory without PDFs
/// - missing credential
/// - output root not creatable, prompt unreadable
/// - model client or pdfium cannot be initialised
pub async fn run(config: &PipelineConfig) -> Result<BatchReport, PipelineError> {
    let documents = discover_documents(&config.input)?;
    info!("Found {} document(s)", documents.len());

    let api_key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(PipelineError::MissingCredential { var: API_KEY_VAR })?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| PipelineError::OutputWriteFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

    let prompt = tokio::fs::read_to_string(&config.prompt_path)
        .await
        .map_err(|e| PipelineError::PromptUnreadable {
            path: config.prompt_path.clone(),
            source: e,
        })?;
    debug!(
        "Prompt {} ({} bytes)",
        config.prompt_path.display(),
        prompt.len()
    );

    let model = GeminiClient::new(
        api_key,
        &config.model,
        Duration::from_secs(config.model_timeout_secs),
    )
    .map_err(|e| PipelineError::ModelClientInit(e.to_string()))?;
    info!("Model: {}", model.model());

    let splitter = PdfiumSplitter::new(config.pdfium_lib_path.as_deref(), config.dpi)?;
    let ocr = CommandOcr::new(&config.ocr_command, config.device);

    let pipeline = Pipeline::new(
        config.clone(),
        prompt,
        Arc::new(splitter),
        Arc::new(ocr),
        Arc::new(model),
    );
    Ok(pipeline.process_batch(documents).await)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a multi-threaded tokio runtime internally.
pub fn run_blocking(config: &PipelineConfig) -> Result<BatchReport, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config))
}
