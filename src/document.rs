//! Input documents, half-page units and the output layout derived from them.
//!
//! Every artifact path is a pure function of the document name and the unit
//! label, so no two units ever write to the same file and reruns overwrite
//! instead of duplicating.
//!
//! ```text
//! {output_dir}/{safe_name}/pdf_pages/{stem}_p01_L.pdf   half-page document
//! {output_dir}/{safe_name}/pdf_pages/{stem}_p01_L.png   half-page image
//! {output_dir}/{safe_name}/p01_l/*.html                 OCR artifacts
//! {output_dir}/{safe_name}/{stem}_p01_l.json            final result
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder used when a document name sanitises to nothing.
pub const EMPTY_NAME_PLACEHOLDER: &str = "pdf";

/// Subdirectory holding the half-page documents and images.
pub const PAGES_DIR: &str = "pdf_pages";

/// An input PDF. Read-only; identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    path: PathBuf,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, e.g. `2019` for `input/2019.pdf`.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name with extension, used in log and status lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Provenance tag stamped as `year` on every JSON result of this document.
    pub fn provenance_tag(&self) -> String {
        self.stem()
    }

    /// Sanitised directory name for this document's outputs.
    pub fn safe_name(&self) -> String {
        safe_name(&self.stem())
    }

    /// `{output_dir}/{safe_name}`.
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        output_root.join(self.safe_name())
    }

    /// `{output_dir}/{safe_name}/{stem}_{label}.json`.
    pub fn json_target(&self, output_root: &Path, unit: &HalfPageUnit) -> PathBuf {
        self.output_dir(output_root)
            .join(format!("{}_{}.json", self.stem(), unit.label()))
    }

    /// `{output_dir}/{safe_name}/{label}`, where OCR writes its artifacts.
    pub fn unit_dir(&self, output_root: &Path, unit: &HalfPageUnit) -> PathBuf {
        self.output_dir(output_root).join(unit.label())
    }
}

/// Replace every non-alphanumeric character with `_`, trim `_` from both
/// ends, and fall back to [`EMPTY_NAME_PLACEHOLDER`] when nothing is left.
///
/// Alphanumeric is Unicode-aware, so Japanese or accented names survive.
pub fn safe_name(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        EMPTY_NAME_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Left or right half of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides in processing order.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Lower-case letter used in unit labels.
    pub fn letter(&self) -> char {
        match self {
            Side::Left => 'l',
            Side::Right => 'r',
        }
    }

    /// Upper-case suffix used in half-page file names.
    pub fn suffix(&self) -> char {
        self.letter().to_ascii_uppercase()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// One half of one page: the minimal unit of OCR + model processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfPageUnit {
    /// 0-indexed page number in the source document.
    pub page_index: usize,
    pub side: Side,
    /// Single-page PDF clipped to this half.
    pub document_path: PathBuf,
    /// Rasterised image of `document_path`.
    pub image_path: PathBuf,
}

impl HalfPageUnit {
    /// Stable label such as `p01_l`, used for output addressing.
    pub fn label(&self) -> String {
        unit_label(self.page_index, self.side)
    }
}

/// `p{page_index + 1:02}_{side letter}`.
pub fn unit_label(page_index: usize, side: Side) -> String {
    format!("p{:02}_{}", page_index + 1, side.letter())
}

/// `{stem}_p{page_index + 1:02}_{SIDE}.{ext}`.
pub fn half_file_name(stem: &str, page_index: usize, side: Side, ext: &str) -> String {
    format!("{}_p{:02}_{}.{}", stem, page_index + 1, side.suffix(), ext)
}
