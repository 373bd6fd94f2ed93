//! The library entry point: fetch, optionally extract, and upload a batch of
//! files.
//!
//! ## Per-file flow
//!
//! ```text
//! FileRef ─▶ gate ─▶ resolve ─▶ extract? ─▶ dispatch (per page) ─▶ UploadResult*
//!            (permit) (download | inline)  (PageStream)
//! ```
//!
//! Files in one batch are processed concurrently, bounded by
//! `BridgeConfig::workers`, and results keep input order. Every file is
//! independent: its failure becomes a failed [`UploadResult`] and never
//! aborts its siblings. Pages of one file are uploaded one at a time in
//! page order.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::limits::WorkerGate;
use crate::output::UploadResult;
use crate::pipeline::download::Downloader;
use crate::pipeline::encode::PNG_MIME;
use crate::pipeline::extract::{page_file_name, DocumentKind, Extractor};
use crate::pipeline::input::{resolve, FetchedFile, FileRef};
use crate::pipeline::office::{DocumentConverter, SofficeConverter};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer, RenderOptions};
use crate::upload::drive::{drive_client, DriveClient};
use crate::upload::{
    dispatch, DestinationHint, DriveUploader, UploadItem, UploadPolicy, UploadTarget,
    WorkspaceUploader,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Destinations for one request.
#[derive(Default)]
pub struct Targets {
    pub primary: Option<Box<dyn UploadTarget>>,
    pub fallback: Option<Box<dyn UploadTarget>>,
}

impl Targets {
    pub fn primary(&self) -> Option<&dyn UploadTarget> {
        self.primary.as_deref()
    }

    pub fn fallback(&self) -> Option<&dyn UploadTarget> {
        self.fallback.as_deref()
    }
}

/// Shared, immutable service state.
pub struct Bridge {
    config: Arc<BridgeConfig>,
    downloader: Downloader,
    api: reqwest::Client,
    drive: DriveClient,
    gate: WorkerGate,
    extractor: Extractor,
}

impl Bridge {
    /// Build with pdfium rendering and LibreOffice conversion.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let renderer = Arc::new(PdfiumRenderer::new(config.pdfium_lib_path.clone()));
        let converter = Arc::new(SofficeConverter::new(
            config.soffice_path.clone(),
            Duration::from_secs(config.convert_timeout_secs),
        ));
        Self::with_components(config, renderer, converter)
    }

    /// Build with the given rendering and conversion backends.
    pub fn with_components(
        config: BridgeConfig,
        renderer: Arc<dyn PageRenderer>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Result<Self, BridgeError> {
        let downloader = Downloader::new(
            config.allowlist.clone(),
            config.max_download_bytes,
            Duration::from_secs(config.download_timeout_secs),
        )?;
        let api = reqwest::Client::builder()
            .user_agent(concat!("media-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Internal(format!("api client: {e}")))?;
        let drive = drive_client()?;
        let gate = WorkerGate::new(config.workers, Duration::from_secs(config.worker_wait_secs));
        let extractor = Extractor::new(
            renderer,
            converter,
            config.extract_mode,
            RenderOptions {
                dpi: config.render_dpi,
                max_pixels: config.max_rendered_pixels,
                max_pages: config.max_pages,
            },
        );

        Ok(Self {
            config: Arc::new(config),
            downloader,
            api,
            drive,
            gate,
            extractor,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Client for provider API calls.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.api
    }

    /// Workspace destination using `token`.
    pub fn workspace_target(&self, token: impl Into<String>) -> WorkspaceUploader {
        WorkspaceUploader::new(
            self.api.clone(),
            &self.config.workspace,
            token,
            Duration::from_secs(self.config.upload_timeout_secs),
        )
    }

    /// Drive destination using `token`, uploading into `folder` (or the
    /// configured default).
    pub fn drive_target(&self, token: impl Into<String>, folder: Option<String>) -> DriveUploader {
        DriveUploader::new(
            self.drive.clone(),
            &self.config.drive,
            token,
            folder,
            Duration::from_secs(self.config.upload_timeout_secs),
        )
    }

    /// Process a batch of files; one or more results per file, in input order.
    pub async fn upload_files(
        &self,
        files: &[FileRef],
        targets: &Targets,
        hint: DestinationHint,
    ) -> Vec<UploadResult> {
        info!("Processing {} file(s)", files.len());
        let pending: Vec<_> = files
            .iter()
            .map(|file| self.upload_one(file, targets, hint))
            .collect();
        let per_file: Vec<Vec<UploadResult>> = stream::iter(pending)
            .buffered(self.config.workers)
            .collect()
            .await;
        per_file.into_iter().flatten().collect()
    }

    async fn upload_one(
        &self,
        file: &FileRef,
        targets: &Targets,
        hint: DestinationHint,
    ) -> Vec<UploadResult> {
        let fail = |e: BridgeError| {
            warn!("'{}' failed: {}", file.name(), e);
            vec![UploadResult::failed(
                file.name(),
                file.name(),
                file.mime_type(),
                e.to_file_error(),
            )]
        };

        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => return fail(e),
        };

        let fetched = match resolve(file, &self.downloader, self.config.max_inline_bytes).await {
            Ok(fetched) => fetched,
            Err(e) => return fail(e),
        };

        let kind = DocumentKind::detect(&fetched.name, &fetched.mime_type)
            .filter(|_| self.extractor.mode().is_enabled());
        match kind {
            Some(kind) => match self.upload_pages(&fetched, kind, targets, hint).await {
                Ok(results) => results,
                Err(e) => fail(e),
            },
            None => {
                let item = UploadItem {
                    source_name: fetched.name.clone(),
                    name: fetched.name,
                    mime_type: fetched.mime_type,
                    bytes: fetched.bytes,
                };
                vec![self.upload_item(&item, targets, hint).await]
            }
        }
    }

    async fn upload_pages(
        &self,
        fetched: &FetchedFile,
        kind: DocumentKind,
        targets: &Targets,
        hint: DestinationHint,
    ) -> Result<Vec<UploadResult>, BridgeError> {
        let mut pages = self.extractor.extract(fetched, kind).await?;
        let mut results = Vec::new();

        while let Some(page) = pages.next().await {
            let result = match page {
                Ok(page) => {
                    let item = UploadItem {
                        source_name: fetched.name.clone(),
                        name: page.name,
                        mime_type: page.mime_type,
                        bytes: page.bytes,
                    };
                    self.upload_item(&item, targets, hint).await
                }
                Err(e) => UploadResult::failed(
                    &fetched.name,
                    &page_file_name(&fetched.name, e.page(), None),
                    PNG_MIME,
                    e.to_file_error(),
                ),
            };
            results.push(result);
        }

        info!(
            "'{}': {} of {} page item(s) uploaded",
            fetched.name,
            results.iter().filter(|r| r.is_uploaded()).count(),
            results.len()
        );
        Ok(results)
    }

    async fn upload_item(
        &self,
        item: &UploadItem,
        targets: &Targets,
        hint: DestinationHint,
    ) -> UploadResult {
        let policy = UploadPolicy::derive(
            hint,
            item.len(),
            self.config.primary_max_upload_bytes,
            targets.fallback.is_some(),
        );
        let outcome = dispatch(targets.primary(), targets.fallback(), policy, item).await;
        UploadResult::from_outcome(item, outcome)
    }
}
