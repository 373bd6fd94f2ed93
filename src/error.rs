//! Error types for the media bridge.
//!
//! Three types reflect three scopes of failure:
//!
//! * [`BridgeError`] is a failure of one operation, either a request that cannot be
//!   served at all (no files, no credential) or a single file that could not
//!   be fetched, converted or uploaded. Every variant belongs to exactly one
//!   [`ErrorClass`], and the class alone decides retry and fallback policy.
//!
//! * [`PageError`] is **non-fatal**: one page of an extracted document failed
//!   to render while its siblings are fine. It travels inside the page stream
//!   so the dispatcher can record it and carry on with the next page.
//!
//! * [`FileError`] is the serialisable descriptor attached to a failed
//!   [`crate::output::UploadResult`]. It is what callers see over the wire.
//!
//! No variant carries a credential. Download URLs are reduced to their host
//! because signed links embed access tokens in the query string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed input or a disallowed origin. Rejected before any I/O; never retried.
    Validation,
    /// Download, inline payload or provider upload over a size/plan ceiling.
    /// The only class that makes an item eligible for the fallback destination.
    SizeLimit,
    /// A required local tool (converter, renderer) is missing. Fatal for the file.
    Capability,
    /// Timeout, connection failure, 5xx or rate limiting. The caller may retry.
    Transient,
    /// The provider refused the credential. Surfaced, never falls back.
    Permission,
    /// Local processing (conversion, rendering, encoding) failed.
    Processing,
}

impl ErrorClass {
    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::SizeLimit => "size_limit",
            ErrorClass::Capability => "capability",
            ErrorClass::Transient => "transient",
            ErrorClass::Permission => "permission",
            ErrorClass::Processing => "processing",
        }
    }

    /// Status used when no more specific one is known.
    pub fn default_status(&self) -> u16 {
        match self {
            ErrorClass::Validation => 400,
            ErrorClass::SizeLimit => 413,
            ErrorClass::Capability => 422,
            ErrorClass::Transient => 502,
            ErrorClass::Permission => 403,
            ErrorClass::Processing => 500,
        }
    }
}

/// Which provider an upstream error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Primary document workspace.
    Workspace,
    /// Fallback cloud drive.
    Drive,
    /// OAuth token endpoint.
    OAuth,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Provider::Workspace => "workspace",
            Provider::Drive => "drive",
            Provider::OAuth => "oauth",
        })
    }
}

/// All errors returned by the media bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Request validation ───────────────────────────────────────────────
    /// The request body or a field in it is malformed.
    #[error("{message}")]
    InvalidRequest { message: String },

    /// The URL could not be parsed.
    #[error("download link is not a valid URL: {reason}")]
    InvalidUrl { reason: String },

    /// The URL uses a scheme other than https.
    #[error("download link must use https (got '{scheme}')")]
    InsecureScheme { scheme: String },

    /// The URL has no host component.
    #[error("download link is missing a hostname")]
    MissingHost,

    /// The host is neither an allowlisted host nor under an allowlisted suffix.
    #[error(
        "download link host '{host}' is not allowed; \
         add it to ALLOWED_DOWNLOAD_HOSTS or ALLOWED_DOWNLOAD_HOST_SUFFIXES"
    )]
    HostNotAllowed { host: String },

    /// The origin redirected to a host outside the allowlist.
    #[error("download from '{host}' redirected to a disallowed location")]
    RedirectNotAllowed { host: String },

    /// Inline payload is not valid base64.
    #[error("inline file '{name}' has an invalid base64 payload")]
    InvalidBase64 { name: String },

    /// Inline payload decoded to zero bytes.
    #[error("inline file '{name}' is empty")]
    EmptyPayload { name: String },

    // ── Size limits ──────────────────────────────────────────────────────
    /// The download exceeded the configured ceiling (declared or streamed).
    #[error("file from '{host}' is too large for the media bridge (max {limit} bytes)")]
    DownloadTooLarge {
        host: String,
        limit: u64,
        declared: Option<u64>,
    },

    /// Inline payload exceeded its ceiling.
    #[error("inline file too large ({size} bytes); max is {limit} bytes")]
    InlineTooLarge { size: u64, limit: u64 },

    // ── Fetch ────────────────────────────────────────────────────────────
    /// The download could not be completed (status, reset, refused).
    #[error("failed to download from '{host}': {reason}")]
    DownloadFailed { host: String, reason: String },

    /// The download did not finish within the timeout.
    #[error("download from '{host}' timed out after {secs}s")]
    DownloadTimeout { host: String, secs: u64 },

    // ── Extraction ───────────────────────────────────────────────────────
    /// No LibreOffice binary could be located.
    #[error(
        "presentation conversion requires LibreOffice (`soffice`) on the bridge runtime; \
         upload a PDF deck or install LibreOffice"
    )]
    ConverterUnavailable,

    /// The pdfium library could not be bound.
    #[error("page rendering is unavailable: {detail}")]
    RendererUnavailable { detail: String },

    /// LibreOffice ran but did not produce a PDF.
    #[error("presentation conversion failed: {detail}")]
    ConversionFailed { detail: String },

    /// LibreOffice exceeded its time budget and was killed.
    #[error("presentation conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    /// The document has no pages.
    #[error("the provided document has no pages")]
    EmptyDocument,

    /// pdfium could not open the document.
    #[error("document could not be opened: {detail}")]
    CorruptDocument { detail: String },

    // ── Upload ───────────────────────────────────────────────────────────
    /// No credential for a destination.
    #[error("missing {provider} credential; {hint}")]
    MissingCredential { provider: Provider, hint: String },

    /// The provider answered with an error status.
    #[error("{provider} rejected the request (HTTP {status}): {summary}")]
    Upstream {
        provider: Provider,
        status: u16,
        class: ErrorClass,
        summary: String,
    },

    /// The provider could not be reached or did not answer in time.
    #[error("{provider} is unreachable: {reason}")]
    UpstreamUnreachable { provider: Provider, reason: String },

    /// The provider answered 2xx but the body lacked a required field.
    #[error("{provider} returned an unexpected response: {detail}")]
    UnexpectedResponse { provider: Provider, detail: String },

    // ── Capacity ─────────────────────────────────────────────────────────
    /// No worker slot became free in time.
    #[error("the bridge is busy; retry later")]
    Busy,

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// The failure class, which decides fallback and retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::InvalidRequest { .. }
            | BridgeError::InvalidUrl { .. }
            | BridgeError::InsecureScheme { .. }
            | BridgeError::MissingHost
            | BridgeError::HostNotAllowed { .. }
            | BridgeError::RedirectNotAllowed { .. }
            | BridgeError::InvalidBase64 { .. }
            | BridgeError::EmptyPayload { .. }
            | BridgeError::EmptyDocument
            | BridgeError::CorruptDocument { .. } => ErrorClass::Validation,

            BridgeError::DownloadTooLarge { .. } | BridgeError::InlineTooLarge { .. } => {
                ErrorClass::SizeLimit
            }

            BridgeError::ConverterUnavailable | BridgeError::RendererUnavailable { .. } => {
                ErrorClass::Capability
            }

            BridgeError::DownloadFailed { .. }
            | BridgeError::DownloadTimeout { .. }
            | BridgeError::UpstreamUnreachable { .. }
            | BridgeError::UnexpectedResponse { .. }
            | BridgeError::Busy => ErrorClass::Transient,

            BridgeError::MissingCredential { .. } => ErrorClass::Permission,

            BridgeError::Upstream { class, .. } => *class,

            BridgeError::ConversionFailed { .. }
            | BridgeError::ConversionTimeout { .. }
            | BridgeError::Internal(_) => ErrorClass::Processing,
        }
    }

    /// HTTP status that best describes this error to a caller.
    pub fn http_status(&self) -> u16 {
        match self {
            BridgeError::Upstream { status, .. } => *status,
            BridgeError::MissingCredential { .. } => 401,
            BridgeError::DownloadTimeout { .. } | BridgeError::ConversionTimeout { .. } => 504,
            BridgeError::Busy => 503,
            other => other.class().default_status(),
        }
    }

    /// Build the wire descriptor for a failed item.
    pub fn to_file_error(&self) -> FileError {
        FileError {
            class: self.class(),
            status: self.http_status(),
            message: self.to_string(),
        }
    }
}

/// A non-fatal error for a single extracted page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered image could not be PNG-encoded.
    #[error("page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The renderer stopped before reaching this page; no later page follows.
    #[error("page {page}: rendering stopped: {detail}")]
    Aborted {
        page: usize,
        class: ErrorClass,
        detail: String,
    },
}

impl PageError {
    /// 1-based page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::Aborted { page, .. } => *page,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PageError::Aborted { class, .. } => *class,
            _ => ErrorClass::Processing,
        }
    }

    /// Wire descriptor for the page's result entry.
    pub fn to_file_error(&self) -> FileError {
        let class = self.class();
        FileError {
            class,
            status: class.default_status(),
            message: self.to_string(),
        }
    }
}

/// Error descriptor carried by a failed upload result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub class: ErrorClass,
    pub status: u16,
    pub message: String,
}

/// Replace every occurrence of a secret in `text` and cap its length.
///
/// Provider diagnostics are free text and occasionally quote back the
/// `Authorization` header they received.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    const MAX: usize = 300;
    let mut out = text.trim().to_string();
    for secret in secrets.iter().filter(|s| s.len() >= 4) {
        out = out.replace(secret, "[redacted]");
    }
    if out.len() > MAX {
        let mut cut = MAX;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push('…');
    }
    out
}
