//! Page extraction: documents → a lazy stream of PNG page images.
//!
//! ## Why a channel of capacity 1?
//!
//! pdfium is blocking and not async-safe, so rendering runs on the blocking
//! pool. The producer renders one page, encodes it and blocks on the channel
//! until the uploader has taken the previous page. Memory stays at roughly
//! one rendered page per file, and dropping the returned stream closes the
//! channel so the producer stops at the next page boundary.
//!
//! Open failures (converter missing, corrupt document, zero pages) are
//! reported before the stream is returned, through a oneshot the producer
//! answers as soon as the document is open. Per-page failures travel inside
//! the stream as [`PageError`]. A renderer that errors or panics after the
//! document opened ends the stream with a [`PageError::Aborted`] for the
//! first page it never delivered.

use crate::config::ExtractMode;
use crate::error::{BridgeError, ErrorClass, PageError};
use crate::pipeline::crop::{crop, detect_regions};
use crate::pipeline::encode::{encode_png, PNG_MIME};
use crate::pipeline::input::FetchedFile;
use crate::pipeline::office::DocumentConverter;
use crate::pipeline::render::{PageRenderer, RenderEvent, RenderOptions};
use bytes::Bytes;
use image::DynamicImage;
use std::ops::ControlFlow;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of extracted pages, in page order.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<ExtractedPage, PageError>> + Send>>;

const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const PPT_MIME: &str = "application/vnd.ms-powerpoint";

/// Documents the extractor knows how to split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// PowerPoint decks; converted to PDF first.
    Presentation,
}

impl DocumentKind {
    /// Classify by media type or file extension; `None` for everything else.
    pub fn detect(name: &str, mime_type: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime == "application/pdf" || lower.ends_with(".pdf") {
            Some(DocumentKind::Pdf)
        } else if lower.ends_with(".pptx")
            || lower.ends_with(".ppt")
            || mime == PPTX_MIME
            || mime == PPT_MIME
        {
            Some(DocumentKind::Presentation)
        } else {
            None
        }
    }
}

/// One image produced from a document page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// 1-based source page.
    pub index: usize,
    /// 1-based crop number on that page in diagram mode.
    pub region: Option<usize>,
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Output file name for a page or crop of `source`.
///
/// `deck.pptx`, page 3 → `deck_slide_003.png`; crop 2 of it →
/// `deck_slide_003_fig2.png`.
pub fn page_file_name(source: &str, index: usize, region: Option<usize>) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("slides");
    match region {
        Some(n) => format!("{stem}_slide_{index:03}_fig{n}.png"),
        None => format!("{stem}_slide_{index:03}.png"),
    }
}

/// Splits PDFs and presentations into page images.
#[derive(Clone)]
pub struct Extractor {
    renderer: Arc<dyn PageRenderer>,
    converter: Arc<dyn DocumentConverter>,
    mode: ExtractMode,
    opts: RenderOptions,
}

impl Extractor {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        converter: Arc<dyn DocumentConverter>,
        mode: ExtractMode,
        opts: RenderOptions,
    ) -> Self {
        Self {
            renderer,
            converter,
            mode,
            opts,
        }
    }

    pub fn mode(&self) -> ExtractMode {
        self.mode
    }

    /// Start extracting `file`.
    ///
    /// Returns once the document is open; pages are produced as the stream
    /// is polled. At most `max_pages` source pages are rendered.
    pub async fn extract(
        &self,
        file: &FetchedFile,
        kind: DocumentKind,
    ) -> Result<PageStream, BridgeError> {
        let dir = tempfile::tempdir()
            .map_err(|e| BridgeError::Internal(format!("tempdir: {e}")))?;

        // The caller's name never becomes a path; only the extension survives.
        let ext = match kind {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Presentation if file.name.to_ascii_lowercase().ends_with(".ppt") => "ppt",
            DocumentKind::Presentation => "pptx",
        };
        let source = dir.path().join(format!("source.{ext}"));
        tokio::fs::write(&source, &file.bytes)
            .await
            .map_err(|e| BridgeError::Internal(format!("tempfile write: {e}")))?;

        let pdf = match kind {
            DocumentKind::Pdf => source,
            DocumentKind::Presentation => {
                self.converter
                    .to_pdf(&source, &dir.path().join("converted"))
                    .await?
            }
        };

        let (open_tx, open_rx) = oneshot::channel::<Result<usize, BridgeError>>();
        let (tx, rx) = mpsc::channel(1);
        let renderer = Arc::clone(&self.renderer);
        let opts = self.opts;
        let mode = self.mode;
        let source_name = file.name.clone();
        // First page not yet handed to the channel.
        let next_page = Arc::new(AtomicUsize::new(1));
        let producer_next = Arc::clone(&next_page);
        let panic_tx = tx.clone();

        let producer = tokio::task::spawn_blocking(move || {
            // Owns the temp dir until rendering is over.
            let _dir = dir;
            let mut open_tx = Some(open_tx);

            let result = renderer.render(&pdf, &opts, &mut |event| match event {
                RenderEvent::Opened { total_pages } => {
                    if let Some(open) = open_tx.take() {
                        let _ = open.send(Ok(total_pages));
                    }
                    ControlFlow::Continue(())
                }
                RenderEvent::Page { index, image } => {
                    if index > opts.max_pages {
                        return ControlFlow::Break(());
                    }
                    for item in page_items(&source_name, index, image, mode) {
                        if tx.blocking_send(item).is_err() {
                            debug!("Page consumer dropped; stopping at page {}", index);
                            return ControlFlow::Break(());
                        }
                    }
                    producer_next.store(index + 1, Ordering::Relaxed);
                    if index >= opts.max_pages {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            });

            if let Err(e) = result {
                match open_tx.take() {
                    Some(open) => {
                        let _ = open.send(Err(e));
                    }
                    None => {
                        let page = producer_next.load(Ordering::Relaxed);
                        warn!("Renderer failed after opening '{}' at page {}: {}", source_name, page, e);
                        let _ = tx.blocking_send(Err(PageError::Aborted {
                            page,
                            class: e.class(),
                            detail: e.to_string(),
                        }));
                    }
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = producer.await {
                if e.is_panic() {
                    let page = next_page.load(Ordering::Relaxed);
                    warn!("Renderer panicked at page {}", page);
                    let _ = panic_tx
                        .send(Err(PageError::Aborted {
                            page,
                            class: ErrorClass::Processing,
                            detail: "renderer panicked".into(),
                        }))
                        .await;
                }
            }
        });

        match open_rx.await {
            Ok(Ok(total_pages)) => {
                if total_pages > opts.max_pages {
                    info!(
                        "'{}' has {} pages; extracting the first {}",
                        file.name, total_pages, opts.max_pages
                    );
                } else {
                    info!("Extracting {} pages from '{}'", total_pages, file.name);
                }
                Ok(Box::pin(ReceiverStream::new(rx)))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BridgeError::Internal(
                "renderer stopped before opening the document".into(),
            )),
        }
    }
}

/// Turn one rendered page into the items to emit for it.
fn page_items(
    source: &str,
    index: usize,
    image: Result<DynamicImage, PageError>,
    mode: ExtractMode,
) -> Vec<Result<ExtractedPage, PageError>> {
    let image = match image {
        Ok(img) => img,
        Err(e) => {
            warn!("{}", e);
            return vec![Err(e)];
        }
    };

    if mode == ExtractMode::Diagram {
        match detect_regions(&image) {
            Ok(regions) if !regions.is_empty() => {
                debug!("Page {}: {} diagram regions", index, regions.len());
                return regions
                    .iter()
                    .enumerate()
                    .map(|(n, region)| encode_item(source, index, Some(n + 1), &crop(&image, region)))
                    .collect();
            }
            Ok(_) => debug!("Page {}: no diagram regions; emitting full page", index),
            Err(e) => debug!("Page {}: {}; emitting full page", index, e),
        }
    }

    vec![encode_item(source, index, None, &image)]
}

fn encode_item(
    source: &str,
    index: usize,
    region: Option<usize>,
    image: &DynamicImage,
) -> Result<ExtractedPage, PageError> {
    let png = encode_png(image).map_err(|e| PageError::EncodeFailed {
        page: index,
        detail: e.to_string(),
    })?;
    Ok(ExtractedPage {
        index,
        region,
        name: page_file_name(source, index, region),
        mime_type: PNG_MIME.to_string(),
        bytes: Bytes::from(png),
    })
}
