//! Splitter tests against a real pdfium library.
//!
//! They need a loadable pdfium and are gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test split

use halfpage_json::pipeline::split::{bind_pdfium, PageSplitter, PdfiumSplitter};
use halfpage_json::{Document, Side};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

macro_rules! skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run pdfium tests");
            return;
        }
    }};
}

fn lib_path() -> Option<PathBuf> {
    std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from)
}

/// Write a PDF whose pages have the given `(width, height)` in points.
fn write_pdf(path: &Path, sizes: &[(f32, f32)]) {
    let pdfium = bind_pdfium(lib_path().as_deref()).unwrap();
    let mut document = pdfium.create_new_pdf().unwrap();
    for &(width, height) in sizes {
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(width),
                PdfPoints::new(height),
            ))
            .unwrap();
    }
    document.save_to_file(path).unwrap();
}

fn page_size(path: &Path) -> (f32, f32) {
    let pdfium = bind_pdfium(lib_path().as_deref()).unwrap();
    let document = pdfium.load_pdf_from_file(path, None).unwrap();
    assert_eq!(document.pages().len(), 1, "{} has one page", path.display());
    let page = document.pages().get(0).unwrap();
    (page.width().value, page.height().value)
}

#[tokio::test]
async fn halves_are_clipped_to_half_the_width() {
    skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("2019.pdf");
    write_pdf(&source, &[(600.0, 800.0), (400.0, 500.0)]);

    let splitter = PdfiumSplitter::new(lib_path().as_deref(), 72).unwrap();
    let document = Document::new(&source);
    let out = tmp.path().join("out").join("2019");
    let units = splitter.split(&document, &out).await.unwrap();

    assert_eq!(units.len(), 4);
    let expected = [(300.0, 800.0), (300.0, 800.0), (200.0, 500.0), (200.0, 500.0)];
    for (unit, (width, height)) in units.iter().zip(expected) {
        let (w, h) = page_size(&unit.document_path);
        assert!((w - width).abs() < 0.5, "{}: width {w}", unit.label());
        assert!((h - height).abs() < 0.5, "{}: height {h}", unit.label());

        let (px_w, px_h) = image::image_dimensions(&unit.image_path).unwrap();
        assert!((px_w as f32 - width).abs() <= 1.0, "{}: {px_w} px", unit.label());
        assert!((px_h as f32 - height).abs() <= 1.0, "{}: {px_h} px", unit.label());
    }
    assert_eq!(units[0].side, Side::Left);
    assert_eq!(units[1].side, Side::Right);
}

#[tokio::test]
async fn unreadable_pdf_fails_the_document() {
    skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("broken.pdf");
    std::fs::write(&source, b"not a pdf").unwrap();

    let splitter = PdfiumSplitter::new(lib_path().as_deref(), 72).unwrap();
    let err = splitter
        .split(&Document::new(&source), &tmp.path().join("out"))
        .await
        .unwrap_err();
    assert!(matches!(err, halfpage_json::PipelineError::CorruptPdf { .. }));
}
