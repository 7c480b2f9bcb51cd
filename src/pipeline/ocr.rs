//! OCR collaborator: run the external OCR command on one half-page image and
//! pick the HTML it produced.
//!
//! The command is invoked as
//!
//! ```text
//! {ocr_command} {image} -f html -o {unit_dir} -d {cpu|cuda}
//! ```
//!
//! It may leave several artifacts in `unit_dir` (and older ones from a
//! previous run); the most recently modified `.html` file is the result.

use crate::config::Device;
use crate::error::UnitError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::process::Command;
use tracing::debug;

/// Bytes of stderr kept in an [`UnitError::OcrFailed`] message.
const STDERR_TAIL: usize = 400;

/// Produces one HTML file for an image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// OCR `image` into `out_dir` and return the selected HTML file.
    async fn run(&self, image: &Path, out_dir: &Path) -> Result<PathBuf, UnitError>;
}

/// [`OcrEngine`] that shells out to an OCR command.
#[derive(Debug, Clone)]
pub struct CommandOcr {
    command: PathBuf,
    device: Device,
}

impl CommandOcr {
    pub fn new(command: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            command: command.into(),
            device,
        }
    }

    /// Arguments passed after the command name.
    pub fn args(&self, image: &Path, out_dir: &Path) -> Vec<std::ffi::OsString> {
        vec![
            image.as_os_str().to_owned(),
            "-f".into(),
            "html".into(),
            "-o".into(),
            out_dir.as_os_str().to_owned(),
            "-d".into(),
            self.device.as_str().into(),
        ]
    }
}

#[async_trait]
impl OcrEngine for CommandOcr {
    async fn run(&self, image: &Path, out_dir: &Path) -> Result<PathBuf, UnitError> {
        debug!(
            "OCR {} → {} on {}",
            image.display(),
            out_dir.display(),
            self.device
        );

        let output = Command::new(&self.command)
            .args(self.args(image, out_dir))
            .output()
            .await
            .map_err(|e| UnitError::OcrFailed {
                detail: format!("could not start '{}': {}", self.command.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UnitError::OcrFailed {
                detail: format!(
                    "{} exited with {}: {}",
                    self.command.display(),
                    output.status,
                    tail(&stderr)
                ),
            });
        }

        latest_html(out_dir).await
    }
}

/// The most recently modified `.html` file directly inside `dir`.
pub async fn latest_html(dir: &Path) -> Result<PathBuf, UnitError> {
    let not_found = || UnitError::NoOutputFound {
        dir: dir.to_path_buf(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(|_| not_found())?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await.map_err(|_| not_found())? {
        let path = entry.path();
        let is_html = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("html"))
            .unwrap_or(false);
        if !is_html {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(not_found)
}

/// Last few hundred bytes of a process's stderr, trimmed.
fn tail(text: &str) -> &str {
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text;
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        fs::write(path, "<html></html>").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[tokio::test]
    async fn newest_html_wins() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("old.html"), 600);
        touch(&tmp.path().join("new.html"), 5);
        touch(&tmp.path().join("newer.json"), 0);

        let picked = latest_html(tmp.path()).await.unwrap();
        assert_eq!(picked.file_name().unwrap(), "new.html");
    }

    #[tokio::test]
    async fn no_html_is_no_output_found() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("page.md"), "x").unwrap();

        let err = latest_html(tmp.path()).await.unwrap_err();
        assert!(matches!(err, UnitError::NoOutputFound { .. }));
    }

    #[tokio::test]
    async fn missing_directory_is_no_output_found() {
        let err = tokio_test::assert_err!(latest_html(Path::new("/definitely/not/here")).await);
        assert!(matches!(err, UnitError::NoOutputFound { .. }));
    }

    #[test]
    fn command_line_shape() {
        let ocr = CommandOcr::new("yomitoku", Device::Cpu);
        let args = ocr.args(Path::new("img.png"), Path::new("out/p01_l"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["img.png", "-f", "html", "-o", "out/p01_l", "-d", "cpu"]
        );
    }

    #[tokio::test]
    async fn missing_command_is_ocr_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ocr = CommandOcr::new("/definitely/not/an/ocr-binary", Device::Cpu);
        let err = ocr
            .run(&tmp.path().join("img.png"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::OcrFailed { .. }));
    }

    #[test]
    fn tail_keeps_the_end() {
        let long = "x".repeat(1000) + "END";
        assert!(tail(&long).ends_with("END"));
        assert_eq!(tail(&long).len(), STDERR_TAIL);
        assert_eq!(tail("  short \n"), "short");
    }
}
