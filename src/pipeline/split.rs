//! Splitter: cut every page of a document into left/right single-page PDFs
//! and rasterise each half to a PNG.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is not async-safe.
//! All pdfium work for one document runs on the blocking pool so Tokio
//! worker threads keep driving OCR processes and model calls meanwhile.
//!
//! Planning (geometry checks, file names, labels) is separated from the
//! pdfium calls so it can be tested without a pdfium library.

use crate::document::{half_file_name, Document, HalfPageUnit, Side, PAGES_DIR};
use crate::error::PipelineError;
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns one document into its ordered half-page units.
///
/// A failure is document-level: without pages no unit can be produced, so
/// the error is returned rather than retried.
#[async_trait]
pub trait PageSplitter: Send + Sync {
    /// Split `document`, writing half-page artifacts below `output_dir`.
    async fn split(
        &self,
        document: &Document,
        output_dir: &Path,
    ) -> Result<Vec<HalfPageUnit>, PipelineError>;
}

/// A half-page unit plus the horizontal clip applied to its source page.
#[derive(Debug, Clone, PartialEq)]
pub struct HalfPlan {
    pub unit: HalfPageUnit,
    pub x0: f32,
    pub x1: f32,
    pub height: f32,
}

/// Plan the halves of every page given `(width, height)` in points.
///
/// Produces exactly two plans per page, ordered by page then LEFT before
/// RIGHT. The midline is `width / 2`.
pub fn plan_halves(
    source: &Path,
    stem: &str,
    pages_dir: &Path,
    page_sizes: &[(f32, f32)],
) -> Result<Vec<HalfPlan>, PipelineError> {
    let mut plans = Vec::with_capacity(page_sizes.len() * 2);

    for (page_index, &(width, height)) in page_sizes.iter().enumerate() {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(PipelineError::InvalidPageGeometry {
                path: source.to_path_buf(),
                page: page_index + 1,
                width,
                height,
            });
        }
        let mid = width / 2.0;

        for side in Side::BOTH {
            let (x0, x1) = match side {
                Side::Left => (0.0, mid),
                Side::Right => (mid, width),
            };
            plans.push(HalfPlan {
                unit: HalfPageUnit {
                    page_index,
                    side,
                    document_path: pages_dir.join(half_file_name(stem, page_index, side, "pdf")),
                    image_path: pages_dir.join(half_file_name(stem, page_index, side, "png")),
                },
                x0,
                x1,
                height,
            });
        }
    }

    Ok(plans)
}

/// Bind to pdfium: an explicit library file, else the working directory,
/// else the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bindings = match lib_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// [`PageSplitter`] backed by pdfium.
///
/// A `Pdfium` handle cannot cross threads, so each document binds its own
/// inside the blocking task that uses it.
#[derive(Debug, Clone)]
pub struct PdfiumSplitter {
    lib_path: Option<PathBuf>,
    dpi: u32,
}

impl PdfiumSplitter {
    /// Check that pdfium can be bound, then keep only what is needed to
    /// bind it again per document. A missing library fails here, before
    /// any document is scheduled.
    pub fn new(lib_path: Option<&Path>, dpi: u32) -> Result<Self, PipelineError> {
        drop(bind_pdfium(lib_path)?);
        Ok(Self {
            lib_path: lib_path.map(Path::to_path_buf),
            dpi,
        })
    }
}

#[async_trait]
impl PageSplitter for PdfiumSplitter {
    async fn split(
        &self,
        document: &Document,
        output_dir: &Path,
    ) -> Result<Vec<HalfPageUnit>, PipelineError> {
        let lib_path = self.lib_path.clone();
        let source = document.path().to_path_buf();
        let stem = document.stem();
        let pages_dir = output_dir.join(PAGES_DIR);
        let dpi = self.dpi;

        let units = tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(lib_path.as_deref())?;
            split_blocking(&pdfium, &source, &stem, &pages_dir, dpi)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Split task panicked: {}", e)))??;

        info!(
            "{}: {} half-page units",
            document.file_name(),
            units.len()
        );
        Ok(units)
    }
}

/// Blocking implementation of document splitting.
fn split_blocking(
    pdfium: &Pdfium,
    source_path: &Path,
    stem: &str,
    pages_dir: &Path,
    dpi: u32,
) -> Result<Vec<HalfPageUnit>, PipelineError> {
    std::fs::create_dir_all(pages_dir).map_err(|e| PipelineError::OutputWriteFailed {
        path: pages_dir.to_path_buf(),
        source: e,
    })?;

    let source = pdfium
        .load_pdf_from_file(source_path, None)
        .map_err(|e| PipelineError::CorruptPdf {
            path: source_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let page_sizes: Vec<(f32, f32)> = source
        .pages()
        .iter()
        .map(|page| (page.width().value, page.height().value))
        .collect();
    debug!("{}: {} pages loaded", source_path.display(), page_sizes.len());

    let plans = plan_halves(source_path, stem, pages_dir, &page_sizes)?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    for plan in &plans {
        write_half(pdfium, &source, source_path, plan)?;
        render_half(pdfium, &plan.unit, &render_config)?;
    }

    Ok(plans.into_iter().map(|plan| plan.unit).collect())
}

/// Copy the plan's page into a fresh document clipped to one half and save it.
fn write_half(
    pdfium: &Pdfium,
    source: &PdfDocument<'_>,
    source_path: &Path,
    plan: &HalfPlan,
) -> Result<(), PipelineError> {
    let page_num = plan.unit.page_index + 1;
    let split_err = |e: PdfiumError| PipelineError::SplitFailed {
        path: source_path.to_path_buf(),
        page: page_num,
        detail: format!("{:?}", e),
    };

    let mut half = pdfium.create_new_pdf().map_err(split_err)?;
    half.pages_mut()
        .copy_page_from_document(source, plan.unit.page_index as PdfPageIndex, 0)
        .map_err(split_err)?;

    let clip = PdfRect::new_from_values(0.0, plan.x0, plan.height, plan.x1);
    {
        let mut page = half.pages().get(0).map_err(split_err)?;
        page.boundaries_mut().set_media(clip).map_err(split_err)?;
        page.boundaries_mut().set_crop(clip).map_err(split_err)?;
    }

    half.save_to_file(&plan.unit.document_path)
        .map_err(split_err)?;
    debug!(
        "Wrote {} ({:.1}..{:.1} pt)",
        plan.unit.document_path.display(),
        plan.x0,
        plan.x1
    );
    Ok(())
}

/// Rasterise the single page of a half-page document to PNG.
fn render_half(
    pdfium: &Pdfium,
    unit: &HalfPageUnit,
    render_config: &PdfRenderConfig,
) -> Result<(), PipelineError> {
    let raster_err = |detail: String| PipelineError::RasterisationFailed {
        path: unit.document_path.clone(),
        detail,
    };

    let document = pdfium
        .load_pdf_from_file(&unit.document_path, None)
        .map_err(|e| raster_err(format!("{:?}", e)))?;
    let page = document
        .pages()
        .get(0)
        .map_err(|e| raster_err(format!("{:?}", e)))?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| raster_err(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    image
        .save_with_format(&unit.image_path, ImageFormat::Png)
        .map_err(|e| raster_err(e.to_string()))?;

    debug!(
        "Rendered {} → {}x{} px",
        unit.image_path.display(),
        image.width(),
        image.height()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const A4: (f32, f32) = (595.0, 842.0);

    fn plan(sizes: &[(f32, f32)]) -> Result<Vec<HalfPlan>, PipelineError> {
        plan_halves(
            Path::new("in/2019.pdf"),
            "2019",
            Path::new("out/2019/pdf_pages"),
            sizes,
        )
    }

    #[test]
    fn two_units_per_page_in_order() {
        let plans = plan(&[A4, A4, A4]).unwrap();
        assert_eq!(plans.len(), 6);

        let order: Vec<(usize, Side)> = plans
            .iter()
            .map(|p| (p.unit.page_index, p.unit.side))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, Side::Left),
                (0, Side::Right),
                (1, Side::Left),
                (1, Side::Right),
                (2, Side::Left),
                (2, Side::Right),
            ]
        );
    }

    #[test]
    fn halves_meet_at_the_midline() {
        let plans = plan(&[(600.0, 800.0)]).unwrap();
        assert_eq!((plans[0].x0, plans[0].x1), (0.0, 300.0));
        assert_eq!((plans[1].x0, plans[1].x1), (300.0, 600.0));
        assert!(plans.iter().all(|p| p.height == 800.0));
    }

    #[test]
    fn paths_are_deterministic() {
        let plans = plan(&[A4]).unwrap();
        assert_eq!(
            plans[0].unit.document_path,
            PathBuf::from("out/2019/pdf_pages/2019_p01_L.pdf")
        );
        assert_eq!(
            plans[1].unit.image_path,
            PathBuf::from("out/2019/pdf_pages/2019_p01_R.png")
        );
        assert_eq!(plans, plan(&[A4]).unwrap());
    }

    #[test]
    fn zero_width_page_fails_the_document() {
        let err = plan(&[A4, (0.0, 842.0)]).unwrap_err();
        match err {
            PipelineError::InvalidPageGeometry { page, .. } => assert_eq!(page, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_or_nan_geometry_is_rejected() {
        assert!(plan(&[(-10.0, 842.0)]).is_err());
        assert!(plan(&[(595.0, f32::NAN)]).is_err());
    }

    #[test]
    fn empty_document_yields_no_units() {
        assert!(plan(&[]).unwrap().is_empty());
    }
}
