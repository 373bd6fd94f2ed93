//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use media_bridge::pipeline::office::DocumentConverter;
use media_bridge::pipeline::render::{PageRenderer, RenderEvent, RenderOptions};
use media_bridge::{BridgeConfig, BridgeConfigBuilder, BridgeError, PageError};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use url::Url;
use wiremock::MockServer;

pub const MIB: usize = 1024 * 1024;

/// A configuration whose every outbound endpoint is `server`.
///
/// Downloads are allowed from `127.0.0.1` over plain http.
pub fn config_for(server: &MockServer) -> BridgeConfigBuilder {
    let base = Url::parse(&server.uri()).unwrap();
    BridgeConfig::builder()
        .allowed_hosts(["127.0.0.1"])
        .allowed_host_suffixes(Vec::<String>::new())
        .allow_insecure_http(true)
        .workspace_api_base(base.clone())
        .drive_api_base(base.clone())
        .oauth_token_url(base.join("/v1/oauth/token").unwrap())
        .worker_wait_secs(5)
        .upload_timeout_secs(5)
        .download_timeout_secs(5)
}

/// Renders `pages` white pages, failing the ones listed in `fail`.
pub struct FakeRenderer {
    pub pages: usize,
    pub fail: Vec<usize>,
}

impl PageRenderer for FakeRenderer {
    fn render(
        &self,
        _pdf: &Path,
        opts: &RenderOptions,
        sink: &mut dyn FnMut(RenderEvent) -> ControlFlow<()>,
    ) -> Result<(), BridgeError> {
        if self.pages == 0 {
            return Err(BridgeError::EmptyDocument);
        }
        if sink(RenderEvent::Opened {
            total_pages: self.pages,
        })
        .is_break()
        {
            return Ok(());
        }
        for index in 1..=self.pages.min(opts.max_pages) {
            let image = if self.fail.contains(&index) {
                Err(PageError::RenderFailed {
                    page: index,
                    detail: "unsupported font".into(),
                })
            } else {
                Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    80,
                    60,
                    Rgb([255, 255, 255]),
                )))
            };
            if sink(RenderEvent::Page { index, image }).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Pretends to convert by copying the input next to where a PDF would go.
pub struct CopyConverter;

#[async_trait]
impl DocumentConverter for CopyConverter {
    async fn to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, BridgeError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        let out = out_dir.join("source.pdf");
        tokio::fs::copy(input, &out)
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        Ok(out)
    }
}
