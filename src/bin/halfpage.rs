//! CLI binary for halfpage-json.
//!
//! A thin shim over the library crate that layers `.env`, environment and
//! flags into a `PipelineConfig`, runs the batch and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use halfpage_json::config::{
    DEFAULT_INPUT_DIR, DEFAULT_MODEL, DEFAULT_OCR_COMMAND, DEFAULT_OUTPUT_DIR,
    DEFAULT_PROMPT_PATH,
};
use halfpage_json::{
    run, BatchReport, Device, Document, DocumentOutcome, InputSelection, PipelineConfig,
    PipelineError, PipelineProgressCallback, ProcessingOutcome, ProgressCallback, UnitError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar counting half-page units across the whole batch. Its length grows
/// as documents are split, since the unit count is unknown up front.
struct CliProgressCallback {
    bar: ProgressBar,
    documents: AtomicUsize,
    split: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} units  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Splitting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            documents: AtomicUsize::new(0),
            split: AtomicUsize::new(0),
        })
    }

    fn document_settled(&self) {
        let settled = self.split.fetch_add(1, Ordering::SeqCst) + 1;
        if settled >= self.documents.load(Ordering::SeqCst) {
            self.bar.set_prefix("Processing");
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, documents: usize) {
        self.documents.store(documents, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {documents} document(s)…"))
        ));
    }

    fn on_document_start(&self, document: &Document, units: usize) {
        self.bar.inc_length(units as u64);
        self.bar.println(format!(
            "  {} {}  {}",
            cyan("▸"),
            document.file_name(),
            dim(&format!("{units} half pages"))
        ));
        self.document_settled();
    }

    fn on_unit_complete(&self, document: &Document, label: &str, path: &Path) {
        self.bar.println(format!(
            "  {} {} {}  {}",
            green("✓"),
            document.file_name(),
            label,
            dim(&path.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, document: &Document, label: &str, error: &UnitError) {
        self.bar
            .println(unit_failure_line(&document.file_name(), label, error));
        self.bar.inc(1);
    }

    fn on_document_error(&self, document: &Document, error: &PipelineError) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            document.file_name(),
            red(&truncate(&error.to_string(), 100)),
        ));
        self.document_settled();
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

/// `✗ <file> <label>  <error>`, the error cut to its first line.
fn unit_failure_line(file_name: &str, label: &str, error: &UnitError) -> String {
    format!(
        "  {} {} {}  {}",
        red("✗"),
        file_name,
        label,
        red(&truncate(&error.to_string(), 100)),
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max_chars - 1).collect();
    format!("{cut}\u{2026}")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every PDF in ./input_pdfs, results under ./outputs
  halfpage

  # One document on CPU
  halfpage --pdf exams/2019.pdf --device cpu

  # More documents in parallel, fewer units per document
  halfpage --pdf-dir exams --max-workers 8 --max-page-workers 2

OUTPUT LAYOUT:
  outputs/{doc}/pdf_pages/{stem}_p01_L.pdf   left half of page 1
  outputs/{doc}/pdf_pages/{stem}_p01_L.png   its image
  outputs/{doc}/p01_l/*.html                 OCR output
  outputs/{doc}/{stem}_p01_l.json            result, "year" = {stem}

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Model credential (required)
  PDF_INPUT               Single input PDF (wins over PDF_INPUT_DIR)
  PDF_INPUT_DIR           Input directory
  PROMPT_PATH             Prompt file
  OUTPUT_DIR              Output root
  DEVICE                  OCR device: cpu | cuda
  GEMINI_MODEL            Model identifier
  YOMITOKU_CMD            OCR command
  MAX_WORKERS             Documents in parallel
  MAX_PAGE_WORKERS        Half pages in parallel per document
  HALFPAGE_DPI            Rasterisation DPI
  HALFPAGE_MODEL_TIMEOUT  Model request timeout in seconds
  PDFIUM_LIB_PATH         Path to libpdfium

  Variables are also read from a .env file in the working directory.
  Variables already set in the environment take precedence over .env,
  and command-line flags take precedence over both.
"#;

/// Split PDF pages into halves, OCR them and extract JSON with a generative model.
#[derive(Parser, Debug)]
#[command(
    name = "halfpage",
    version,
    about = "Split PDF pages into halves, OCR them and extract JSON with a generative model",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Process only this PDF (overrides --pdf-dir).
    #[arg(long, env = "PDF_INPUT")]
    pdf: Option<PathBuf>,

    /// Directory scanned for *.pdf files.
    #[arg(long, env = "PDF_INPUT_DIR", default_value = DEFAULT_INPUT_DIR)]
    pdf_dir: PathBuf,

    /// Prompt file sent with every half page.
    #[arg(long, env = "PROMPT_PATH", default_value = DEFAULT_PROMPT_PATH)]
    prompt: PathBuf,

    /// Output root directory.
    #[arg(short, long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Device passed to the OCR command.
    #[arg(long, env = "DEVICE", value_enum, default_value = "cuda")]
    device: DeviceArg,

    /// Generative model identifier.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OCR command (name on PATH or full path).
    #[arg(long, env = "YOMITOKU_CMD", default_value = DEFAULT_OCR_COMMAND)]
    yomitoku: PathBuf,

    /// Documents processed concurrently.
    #[arg(long, env = "MAX_WORKERS", default_value_t = 4)]
    max_workers: usize,

    /// Half pages processed concurrently within one document.
    #[arg(long, env = "MAX_PAGE_WORKERS", default_value_t = 4)]
    max_page_workers: usize,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "HALFPAGE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Model request timeout in seconds.
    #[arg(long, env = "HALFPAGE_MODEL_TIMEOUT", default_value_t = 600)]
    model_timeout: u64,

    /// Model API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "HALFPAGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HALFPAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HALFPAGE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DeviceArg {
    Cpu,
    Cuda,
}

impl From<DeviceArg> for Device {
    fn from(v: DeviceArg) -> Self {
        match v {
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env never overrides variables already present in the environment.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries per-unit feedback, so library INFO logs are
    // only shown without it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded {}", path.display());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let report = run(&config).await.context("Run failed")?;

    if !cli.quiet {
        if !show_progress {
            print_outcomes(&report);
        }
        print_summary(&report, &config.output_dir);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let input = InputSelection::from_parts(cli.pdf.clone(), Some(cli.pdf_dir.clone()))?;

    let mut builder = PipelineConfig::builder()
        .input(input)
        .prompt_path(&cli.prompt)
        .output_dir(&cli.output)
        .device(cli.device.into())
        .model(&cli.model)
        .ocr_command(&cli.yomitoku)
        .max_workers(cli.max_workers)
        .max_page_workers(cli.max_page_workers)
        .dpi(cli.dpi)
        .model_timeout_secs(cli.model_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Status lines for runs without a progress bar.
fn print_outcomes(report: &BatchReport) {
    for outcome in &report.documents {
        match outcome {
            DocumentOutcome::Completed(doc) => {
                for unit in &doc.outcomes {
                    match unit {
                        ProcessingOutcome::Success { label, path } => eprintln!(
                            "  {} {} {}  {}",
                            green("✓"),
                            doc.document.file_name(),
                            label,
                            dim(&path.display().to_string())
                        ),
                        ProcessingOutcome::Failure { label, error } => eprintln!(
                            "{}",
                            unit_failure_line(&doc.document.file_name(), label, error)
                        ),
                    }
                }
            }
            DocumentOutcome::Failed { document, error } => eprintln!(
                "  {} {}  {}",
                red("✗"),
                document.file_name(),
                red(&truncate(&error.to_string(), 100))
            ),
        }
    }
}

fn print_summary(report: &BatchReport, output_dir: &Path) {
    let written = report.succeeded_units();
    let failed = report.failed_units();
    let failed_docs = report.failed_documents();

    eprintln!(
        "{}  {} unit(s) written  {}ms  →  {}",
        if report.is_clean() { green("✔") } else { cyan("⚠") },
        bold(&written.to_string()),
        report.duration_ms,
        bold(&output_dir.display().to_string()),
    );
    if failed > 0 || failed_docs > 0 {
        eprintln!(
            "   {} unit(s) failed  /  {} document(s) failed",
            red(&failed.to_string()),
            red(&failed_docs.to_string()),
        );
    }
}
