//! PDF rasterisation and text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. `tokio::task::spawn_blocking` moves the work onto
//! the blocking pool so the runtime's worker threads keep serving other
//! requests while a large document renders.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Pages are rendered at `dpi / 72` times their size in points (150 DPI by
//! default), but page sizes vary wildly. `max_rendered_pixels` caps the
//! longest edge regardless of physical size, keeping memory and request
//! bodies bounded.
//!
//! The [`PdfEngine`] trait is the seam the orchestrator talks to; tests swap
//! in an in-memory engine.

use crate::config::ServiceConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::{encode, pdfium::bind_pdfium};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position in the document.
    pub index: usize,
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    /// PNG-encoded image, shared so prompt assembly never copies it.
    pub png: Arc<[u8]>,
}

/// Everything the orchestrator needs from a PDF library.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Render every page, in document order, to a PNG [`Page`].
    ///
    /// The result has exactly one entry per PDF page and `result[i].index == i`.
    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<Page>, Pdf2HtmlError>;

    /// Extract the text layer of every page, in document order.
    async fn extract_text(&self, pdf: &[u8]) -> Result<Vec<String>, Pdf2HtmlError>;
}

/// [`PdfEngine`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    dpi: u32,
    max_rendered_pixels: u32,
    lib_path: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

#[async_trait]
impl PdfEngine for PdfiumEngine {
    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<Page>, Pdf2HtmlError> {
        let bytes = pdf.to_vec();
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.rasterize_blocking(&bytes))
            .await
            .map_err(|e| Pdf2HtmlError::Internal(format!("Render task panicked: {}", e)))?
    }

    async fn extract_text(&self, pdf: &[u8]) -> Result<Vec<String>, Pdf2HtmlError> {
        let bytes = pdf.to_vec();
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.extract_text_blocking(&bytes))
            .await
            .map_err(|e| Pdf2HtmlError::Internal(format!("Text task panicked: {}", e)))?
    }
}

impl PdfiumEngine {
    fn rasterize_blocking(&self, bytes: &[u8]) -> Result<Vec<Page>, Pdf2HtmlError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let document = load_document(&pdfium, bytes)?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(Pdf2HtmlError::NoPages);
        }
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut results = Vec::with_capacity(total_pages);

        for (index, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2HtmlError::RasterisationFailed {
                    page: index + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let png = encode::encode_png(&image).map_err(|e| Pdf2HtmlError::RasterisationFailed {
                page: index + 1,
                detail: format!("PNG encoding failed: {}", e),
            })?;
            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                index + 1,
                image.width(),
                image.height(),
                png.len()
            );

            results.push(Page {
                index,
                width: image.width(),
                height: image.height(),
                png: png.into(),
            });
        }

        Ok(results)
    }

    fn extract_text_blocking(&self, bytes: &[u8]) -> Result<Vec<String>, Pdf2HtmlError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;
        let document = load_document(&pdfium, bytes)?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(Pdf2HtmlError::NoPages);
        }

        pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                page.text()
                    .map(|text| text.all())
                    .map_err(|e| Pdf2HtmlError::TextExtractionFailed {
                        page: index + 1,
                        detail: format!("{:?}", e),
                    })
            })
            .collect()
    }
}

/// Open a PDF from memory, mapping pdfium's load errors onto ours.
fn load_document<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, Pdf2HtmlError> {
    pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            Pdf2HtmlError::PasswordRequired
        } else {
            Pdf2HtmlError::CorruptPdf { detail: err_str }
        }
    })
}
