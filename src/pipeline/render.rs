//! PDF rasterisation: render pages to `DynamicImage` via pdfium.
//!
//! pdfium is not async-safe, so the work runs inside
//! `tokio::task::spawn_blocking`. Pages are rendered at a fixed DPI
//! ([`crate::config::OcrConfig::dpi`]); the segmenter's pixel thresholds are
//! tuned against that resolution.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::pipeline::encode::save_png;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Points per inch in PDF user space.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number within the source document.
    pub number: usize,
    pub image: DynamicImage,
}

impl PageImage {
    /// Artefact name for this page.
    pub fn filename(&self) -> String {
        format!("page_{}.png", self.number)
    }
}

/// A rasterised PDF: selected pages in ascending page order.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    /// Page count of the whole PDF, not just the selection.
    pub total_pages: usize,
    pub pages: Vec<PageImage>,
}

/// Rasterise the selected pages of a PDF.
pub async fn render_document(pdf_path: &Path, config: &OcrConfig) -> Result<Document, OcrError> {
    if !pdf_path.exists() {
        return Err(OcrError::FileNotFound {
            path: pdf_path.to_path_buf(),
        });
    }

    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let password = config.password.clone();
    let selection = config.pages.clone();

    tokio::task::spawn_blocking(move || {
        render_blocking(&path, dpi, password.as_deref(), |total| {
            selection.to_indices(total)
        })
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    select: impl FnOnce(usize) -> Vec<usize>,
) -> Result<Document, OcrError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| OcrError::PdfiumBindingFailed(e.to_string()))?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                OcrError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                OcrError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            OcrError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = select(total_pages);
    if indices.is_empty() {
        return Err(OcrError::PageOutOfRange {
            page: 0,
            total: total_pages,
        });
    }

    let render_config =
        PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / PDF_POINTS_PER_INCH);

    let mut rendered = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| OcrError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            OcrError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        rendered.push(PageImage {
            number: idx + 1,
            image,
        });
    }

    Ok(Document {
        source: pdf_path.to_path_buf(),
        total_pages,
        pages: rendered,
    })
}

/// Persist every page of `doc` as `dir/page_{n}.png`.
pub fn save_pages(doc: &Document, dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    std::fs::create_dir_all(dir).map_err(|e| OcrError::ArtifactWriteFailed {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    doc.pages
        .iter()
        .map(|page| {
            let path = dir.join(page.filename());
            save_png(&page.image, &path)?;
            debug!("Saved {}", path.display());
            Ok(path)
        })
        .collect()
}
