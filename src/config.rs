//! Configuration types for a pipeline run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The value is resolved once at startup, wrapped
//! in an `Arc` by [`crate::schedule::Pipeline`] and shared read-only by every
//! document and unit task; nothing inside the concurrent core reads the
//! environment.
//!
//! The CLI layers sources in this order (later wins): built-in defaults,
//! `.env`, process environment, command-line flags.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default directory scanned for input documents.
pub const DEFAULT_INPUT_DIR: &str = "input_pdfs";
/// Default prompt file.
pub const DEFAULT_PROMPT_PATH: &str = "prompt.md";
/// Default output root.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
/// Default generative model identifier.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash";
/// Default OCR command, looked up on `PATH`.
pub const DEFAULT_OCR_COMMAND: &str = "yomitoku";

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use halfpage_json::{Device, InputSelection, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .input(InputSelection::Single("exam_2019.pdf".into()))
///     .device(Device::Cpu)
///     .max_workers(2)
///     .max_page_workers(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_page_workers, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Which documents to process. Default: `Directory("input_pdfs")`.
    pub input: InputSelection,

    /// Prompt file, read once per run and sent unchanged with every unit.
    pub prompt_path: PathBuf,

    /// Root under which every document gets its own sanitised directory.
    pub output_dir: PathBuf,

    /// Device passed to the OCR command. Default: [`Device::Cuda`].
    pub device: Device,

    /// Generative model identifier, e.g. `models/gemini-2.5-flash`.
    pub model: String,

    /// OCR executable. Bare names are resolved through `PATH`.
    pub ocr_command: PathBuf,

    /// Documents processed concurrently. Default: 4.
    pub max_workers: usize,

    /// Half-page units processed concurrently within one document. Default: 4.
    ///
    /// The worst-case number of in-flight OCR/model calls is
    /// `max_workers * max_page_workers`.
    pub max_page_workers: usize,

    /// Rasterisation resolution for half-page images. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Per-request timeout of the model client in seconds. Default: 600.
    ///
    /// Uploading two documents and generating structured output for a dense
    /// page routinely takes minutes.
    pub model_timeout_secs: u64,

    /// Model API credential. The run fails before any processing when absent.
    pub api_key: Option<String>,

    /// Explicit pdfium library file. If None, the working directory and then
    /// the system library are tried.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Receives per-document and per-unit events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: InputSelection::Directory(PathBuf::from(DEFAULT_INPUT_DIR)),
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            device: Device::default(),
            model: DEFAULT_MODEL.to_string(),
            ocr_command: PathBuf::from(DEFAULT_OCR_COMMAND),
            max_workers: 4,
            max_page_workers: 4,
            dpi: 300,
            model_timeout_secs: 600,
            api_key: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input", &self.input)
            .field("prompt_path", &self.prompt_path)
            .field("output_dir", &self.output_dir)
            .field("device", &self.device)
            .field("model", &self.model)
            .field("ocr_command", &self.ocr_command)
            .field("max_workers", &self.max_workers)
            .field("max_page_workers", &self.max_page_workers)
            .field("dpi", &self.dpi)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input(mut self, input: InputSelection) -> Self {
        self.config.input = input;
        self
    }

    pub fn prompt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.prompt_path = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn ocr_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.config.ocr_command = command.into();
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn max_page_workers(mut self, n: usize) -> Self {
        self.config.max_page_workers = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_timeout_secs = secs;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.model_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Model timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_command.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR command must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which documents a run processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSelection {
    /// One designated PDF.
    Single(PathBuf),
    /// Every `*.pdf` directly inside a directory, sorted by name.
    Directory(PathBuf),
}

impl InputSelection {
    /// Combine the two optional sources; a single document wins over a directory.
    pub fn from_parts(
        single: Option<PathBuf>,
        directory: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let non_empty = |p: Option<PathBuf>| p.filter(|p| !p.as_os_str().is_empty());
        match (non_empty(single), non_empty(directory)) {
            (Some(path), _) => Ok(InputSelection::Single(path)),
            (None, Some(dir)) => Ok(InputSelection::Directory(dir)),
            (None, None) => Err(PipelineError::InputNotSelected),
        }
    }
}

/// Device selector handed to the OCR command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    #[default]
    Cuda,
}

impl Device {
    /// Value passed on the OCR command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_workers, 4);
        assert_eq!(c.max_page_workers, 4);
        assert_eq!(c.dpi, 300);
        assert_eq!(c.model_timeout_secs, 600);
        assert_eq!(c.device, Device::Cuda);
        assert_eq!(c.model, "models/gemini-2.5-flash");
        assert_eq!(
            c.input,
            InputSelection::Directory(PathBuf::from("input_pdfs"))
        );
    }

    #[test]
    fn builder_clamps_workers_and_dpi() {
        let c = PipelineConfig::builder()
            .max_workers(0)
            .max_page_workers(0)
            .dpi(10_000)
            .build()
            .unwrap();
        assert_eq!(c.max_workers, 1);
        assert_eq!(c.max_page_workers, 1);
        assert_eq!(c.dpi, 600);
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = PipelineConfig::builder().model("  ").build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PipelineConfig::builder()
            .model_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PipelineConfig::builder()
            .api_key("secret-key")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn single_document_wins_over_directory() {
        let sel = InputSelection::from_parts(
            Some(PathBuf::from("a.pdf")),
            Some(PathBuf::from("input_pdfs")),
        )
        .unwrap();
        assert_eq!(sel, InputSelection::Single(PathBuf::from("a.pdf")));
    }

    #[test]
    fn empty_paths_count_as_unset() {
        let sel =
            InputSelection::from_parts(Some(PathBuf::new()), Some(PathBuf::from("dir"))).unwrap();
        assert_eq!(sel, InputSelection::Directory(PathBuf::from("dir")));

        let err = InputSelection::from_parts(None, Some(PathBuf::new())).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotSelected));
    }

    #[test]
    fn device_renders_lowercase() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda.as_str(), "cuda");
    }
}
