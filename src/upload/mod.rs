//! Upload destinations and the dispatcher that chooses between them.
//!
//! ```text
//!              ┌──────────────┐  size_limit   ┌──────────────┐
//! UploadItem ─▶│   primary    │ ────────────▶ │   fallback   │
//!              │ (workspace)  │               │   (drive)    │
//!              └──────────────┘               └──────────────┘
//! ```
//!
//! The workspace speaks plain HTTP through `reqwest`; the drive goes through
//! the generated `google_drive3` client. Error responses from both are
//! reduced to a [`BridgeError::Upstream`] whose class comes from
//! [`classify_status`]; the dispatcher only ever looks at that class.

pub mod dispatch;
pub mod drive;
pub mod notion;

use crate::error::{redact, BridgeError, ErrorClass, Provider};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use url::Url;

pub use dispatch::{dispatch, DestinationHint, DispatchOutcome, UploadPolicy};
pub use drive::DriveUploader;
pub use notion::WorkspaceUploader;

/// One payload ready for upload: a fetched file or an extracted page.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Name of the file the caller referenced.
    pub source_name: String,
    /// Name the object is stored under.
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadItem {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a destination returns for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Workspace file-upload id or drive file id.
    pub id: String,
    /// Anonymous download URL (drive only).
    pub public_url: Option<String>,
    /// Browser view URL (drive only).
    pub web_view_url: Option<String>,
}

/// A storage provider.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    fn provider(&self) -> Provider;

    /// Store `item`; one attempt, no retries.
    async fn upload(&self, item: &UploadItem) -> Result<StoredObject, BridgeError>;
}

/// Provider phrases that mean "too big for this account".
const SIZE_HINTS: &[&str] = &[
    "too large",
    "file size",
    "size limit",
    "maximum size",
    "exceeds the maximum",
    "exceeds the limit",
    "plan limit",
    "your plan",
    "upgrade",
    "storagequotaexceeded",
    "storage quota",
];

/// Provider phrases that mean "slow down" even on a 403.
const RATE_HINTS: &[&str] = &["ratelimitexceeded", "rate limit"];

/// Map a provider error status and message to an [`ErrorClass`].
pub fn classify_status(status: u16, message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    let mentions = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));
    match status {
        413 => ErrorClass::SizeLimit,
        403 if mentions(RATE_HINTS) => ErrorClass::Transient,
        400 | 403 if mentions(SIZE_HINTS) => ErrorClass::SizeLimit,
        401 | 403 => ErrorClass::Permission,
        429 | 500..=599 => ErrorClass::Transient,
        400..=499 => ErrorClass::Validation,
        _ => ErrorClass::Transient,
    }
}

/// Turn a non-success provider response into an error.
///
/// `secrets` are redacted from the provider's message before it is kept.
pub async fn upstream_error(
    provider: Provider,
    response: reqwest::Response,
    secrets: &[&str],
) -> BridgeError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let summary = redact(&summarize(&text), secrets);
    BridgeError::Upstream {
        provider,
        status,
        class: classify_status(status, &text),
        summary,
    }
}

/// Error for a provider response whose body was already parsed as JSON.
pub(crate) fn upstream_json_error(
    provider: Provider,
    status: u16,
    body: &Value,
    secrets: &[&str],
) -> BridgeError {
    let summary = summarize_json(body).unwrap_or_else(|| format!("HTTP {status}"));
    BridgeError::Upstream {
        provider,
        status,
        class: classify_status(status, &body.to_string()),
        summary: redact(&summary, secrets),
    }
}

/// Pull `code: message` out of a provider error body, or return it as-is.
fn summarize(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|json| summarize_json(&json))
        .unwrap_or_else(|| text.to_string())
}

/// Workspace errors are `{"code","message"}`; drive errors nest them
/// under `"error"` with the reason in `errors[0].reason`.
fn summarize_json(json: &Value) -> Option<String> {
    let body = json.get("error").filter(|e| e.is_object()).unwrap_or(json);
    let message = body.get("message").and_then(Value::as_str)?;
    let code = body
        .get("code")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/errors/0/reason").and_then(Value::as_str));
    Some(match code {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    })
}

/// Error for a request that never got an answer.
pub fn transport_error(provider: Provider, e: reqwest::Error) -> BridgeError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.without_url().to_string()
    };
    BridgeError::UpstreamUnreachable { provider, reason }
}

/// Join `path` onto `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
