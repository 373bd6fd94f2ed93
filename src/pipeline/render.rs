//! PDF rasterisation behind the [`PageRenderer`] seam.
//!
//! ## Why a callback instead of a `Vec`?
//!
//! A 80-slide deck at 150 DPI is several hundred megabytes of pixels. The
//! renderer hands each page to a sink as soon as it is rasterised and the
//! sink decides whether to continue, so at most one page is alive at a time
//! and a cancelled request stops the renderer at the next page boundary.
//!
//! ## Why bind pdfium explicitly?
//!
//! `Pdfium::default()` panics when the shared library is missing. Binding
//! explicitly turns a missing library into
//! [`BridgeError::RendererUnavailable`], a capability error for that file.
//!
//! All methods are blocking; callers run them inside `spawn_blocking`.

use crate::error::{BridgeError, PageError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rendering parameters for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Dots per inch; PDF user space is 72 units per inch.
    pub dpi: u32,
    /// Cap on either edge of the output image.
    pub max_pixels: u32,
    /// Stop after this many pages.
    pub max_pages: usize,
}

/// Events a renderer reports to its sink, in order.
#[derive(Debug)]
pub enum RenderEvent {
    /// The document opened; `total_pages` is the source page count.
    Opened { total_pages: usize },
    /// One page, numbered from 1.
    Page {
        index: usize,
        image: Result<DynamicImage, PageError>,
    },
}

/// Something that can rasterise a PDF page by page.
pub trait PageRenderer: Send + Sync {
    /// Open `pdf`, report [`RenderEvent::Opened`], then one
    /// [`RenderEvent::Page`] per page up to `opts.max_pages`.
    ///
    /// Returns early when the sink answers `Break`. Errors that prevent the
    /// document from opening are returned; per-page failures are reported as
    /// `Page` events carrying a [`PageError`].
    fn render(
        &self,
        pdf: &Path,
        opts: &RenderOptions,
        sink: &mut dyn FnMut(RenderEvent) -> ControlFlow<()>,
    ) -> Result<(), BridgeError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Bind to the library at `lib_path`, or to the system library when `None`.
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    fn bind(&self) -> Result<Pdfium, BridgeError> {
        let bindings = match &self.lib_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| BridgeError::RendererUnavailable {
            detail: format!("could not bind pdfium: {:?}", e),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(
        &self,
        pdf: &Path,
        opts: &RenderOptions,
        sink: &mut dyn FnMut(RenderEvent) -> ControlFlow<()>,
    ) -> Result<(), BridgeError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| BridgeError::CorruptDocument {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("Document loaded: {} pages", total_pages);
        if total_pages == 0 {
            return Err(BridgeError::EmptyDocument);
        }

        if sink(RenderEvent::Opened { total_pages }).is_break() {
            return Ok(());
        }

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(opts.dpi as f32 / 72.0)
            .set_maximum_width(opts.max_pixels as i32)
            .set_maximum_height(opts.max_pixels as i32);

        for idx in 0..total_pages.min(opts.max_pages) {
            let image = match pages.get(idx as u16) {
                Ok(page) => page
                    .render_with_config(&render_config)
                    .map(|bitmap| bitmap.as_image()),
                Err(e) => Err(e),
            }
            .map_err(|e| PageError::RenderFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            });

            if let Ok(img) = &image {
                debug!("Rendered page {} → {}x{} px", idx + 1, img.width(), img.height());
            }

            if sink(RenderEvent::Page {
                index: idx + 1,
                image,
            })
            .is_break()
            {
                debug!("Render sink closed after page {}", idx + 1);
                break;
            }
        }

        Ok(())
    }
}
