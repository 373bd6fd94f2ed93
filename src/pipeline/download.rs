//! Bounded streaming download.
//!
//! The body is read chunk by chunk and the connection is dropped the moment
//! the running total passes the ceiling; a declared `Content-Length` above
//! the ceiling fails before the first body byte is read. Every redirect hop
//! is re-checked against the allowlist, so an allowlisted origin cannot
//! bounce the bridge to an internal address.
//!
//! Failures are split into two classes on purpose: size-limit errors
//! ([`BridgeError::DownloadTooLarge`]) and transport errors
//! ([`BridgeError::DownloadFailed`], [`BridgeError::DownloadTimeout`]).

use crate::error::BridgeError;
use crate::pipeline::allowlist::{display_host, Allowlist};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Fetches allowlisted URLs with a hard byte ceiling.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    allowlist: Arc<Allowlist>,
    max_bytes: u64,
    timeout: Duration,
}

impl Downloader {
    /// Build a downloader whose redirect policy enforces `allowlist`.
    pub fn new(allowlist: Allowlist, max_bytes: u64, timeout: Duration) -> Result<Self, BridgeError> {
        let allowlist = Arc::new(allowlist);
        let policy_list = Arc::clone(&allowlist);
        let client = reqwest::Client::builder()
            .user_agent(concat!("media-bridge/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if policy_list.check(attempt.url()).is_err() {
                    attempt.error("redirect target is not allowlisted")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(|e| BridgeError::Internal(format!("download client: {e}")))?;

        Ok(Self {
            client,
            allowlist,
            max_bytes,
            timeout,
        })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Validate `raw_url` and fetch it.
    ///
    /// Validation happens first; a rejected URL never reaches the network.
    pub async fn fetch(&self, raw_url: &str) -> Result<Bytes, BridgeError> {
        let url = self.allowlist.validate(raw_url)?;
        self.fetch_validated(&url).await
    }

    async fn fetch_validated(&self, url: &Url) -> Result<Bytes, BridgeError> {
        let host = display_host(url);
        info!("Downloading from {}", host);

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(&host, e))?;

        if !response.status().is_success() {
            return Err(BridgeError::DownloadFailed {
                host,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let declared = response.content_length();
        if let Some(len) = declared {
            if len > self.max_bytes {
                debug!(
                    "Declared length {} exceeds ceiling {}; body not read",
                    len, self.max_bytes
                );
                return Err(BridgeError::DownloadTooLarge {
                    host,
                    limit: self.max_bytes,
                    declared: Some(len),
                });
            }
        }

        let initial = declared.unwrap_or(64 * 1024).min(self.max_bytes);
        let mut buf = BytesMut::with_capacity(usize::try_from(initial).unwrap_or(64 * 1024));
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(&host, e))?;
            if buf.len() as u64 + chunk.len() as u64 > self.max_bytes {
                debug!("Streamed body passed ceiling {}; aborting", self.max_bytes);
                return Err(BridgeError::DownloadTooLarge {
                    host,
                    limit: self.max_bytes,
                    declared: None,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        info!("Downloaded {} bytes from {}", buf.len(), host);
        Ok(buf.freeze())
    }

    fn transport_error(&self, host: &str, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::DownloadTimeout {
                host: host.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else if e.is_redirect() {
            BridgeError::RedirectNotAllowed {
                host: host.to_string(),
            }
        } else {
            // The URL carries a signature; keep it out of the message.
            BridgeError::DownloadFailed {
                host: host.to_string(),
                reason: e.without_url().to_string(),
            }
        }
    }
}
