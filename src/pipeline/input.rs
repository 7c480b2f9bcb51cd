//! Input resolution: turn an [`InputSelection`] into the ordered list of
//! documents a run will process.
//!
//! A directory is scanned non-recursively for `*.pdf` files and the result is
//! sorted by file name, so two runs over the same directory schedule the same
//! documents in the same order.

use crate::config::InputSelection;
use crate::document::Document;
use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the configured input to a non-empty, sorted list of documents.
pub fn discover_documents(selection: &InputSelection) -> Result<Vec<Document>, PipelineError> {
    match selection {
        InputSelection::Single(path) => resolve_single(path).map(|doc| vec![doc]),
        InputSelection::Directory(dir) => scan_directory(dir),
    }
}

fn resolve_single(path: &Path) -> Result<Document, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    debug!("Resolved single PDF: {}", path.display());
    Ok(Document::new(path))
}

fn scan_directory(dir: &Path) -> Result<Vec<Document>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
            path: dir.to_path_buf(),
        },
        _ => PipelineError::Internal(format!("Failed to read '{}': {}", dir.display(), e)),
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_pdf(p))
        .collect();
    pdfs.sort();

    if pdfs.is_empty() {
        return Err(PipelineError::NoDocuments {
            dir: dir.to_path_buf(),
        });
    }

    debug!("Found {} PDF(s) in {}", pdfs.len(), dir.display());
    Ok(pdfs.into_iter().map(Document::new).collect())
}

/// `true` when the path has a `.pdf` extension (any case).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("a.pdf")));
        assert!(is_pdf(Path::new("dir/B.PDF")));
        assert!(!is_pdf(Path::new("a.png")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn directory_scan_is_sorted_and_non_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("2021.pdf"), b"%PDF").unwrap();
        fs::write(tmp.path().join("2019.pdf"), b"%PDF").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/2020.pdf"), b"%PDF").unwrap();

        let docs =
            discover_documents(&InputSelection::Directory(tmp.path().to_path_buf())).unwrap();
        let names: Vec<String> = docs.iter().map(|d| d.file_name()).collect();
        assert_eq!(names, vec!["2019.pdf", "2021.pdf"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err =
            discover_documents(&InputSelection::Directory(tmp.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, PipelineError::NoDocuments { .. }));
    }

    #[test]
    fn missing_inputs_are_not_found() {
        let err = discover_documents(&InputSelection::Single(PathBuf::from(
            "/definitely/not/here.pdf",
        )))
        .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));

        let err = discover_documents(&InputSelection::Directory(PathBuf::from(
            "/definitely/not/here",
        )))
        .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn single_document_is_returned_as_is() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("only.pdf");
        fs::write(&path, b"%PDF").unwrap();

        let docs = discover_documents(&InputSelection::Single(path.clone())).unwrap();
        assert_eq!(docs, vec![Document::new(path)]);
    }
}
