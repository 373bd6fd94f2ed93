//! Configuration types for the media bridge.
//!
//! All behaviour is controlled through [`BridgeConfig`], built via its
//! [`BridgeConfigBuilder`]. The configuration is read once at start-up and is
//! immutable afterwards; components receive it explicitly (usually as
//! `Arc<BridgeConfig>`) so tests can run isolated configurations side by side.

use crate::error::BridgeError;
use crate::pipeline::allowlist::Allowlist;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Default exact hosts allowed as download origins.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "files.openai.com",
    "files.oaiusercontent.com",
    "files.openaiusercontent.com",
];

/// Default host suffixes allowed as download origins.
pub const DEFAULT_ALLOWED_SUFFIXES: &[&str] = &["oaiusercontent.com", "openaiusercontent.com"];

const MIB: u64 = 1024 * 1024;

/// Configuration for the media bridge.
///
/// # Example
/// ```rust
/// use media_bridge::{BridgeConfig, ExtractMode};
///
/// let config = BridgeConfig::builder()
///     .extract_mode(ExtractMode::Page)
///     .max_pages(40)
///     .render_dpi(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 40);
/// ```
#[derive(Clone)]
pub struct BridgeConfig {
    /// Download origins. Default: the agent platform's file hosts.
    pub allowlist: Allowlist,

    /// Ceiling on bytes fetched from a download link. Default: 30 MiB.
    pub max_download_bytes: u64,

    /// Ceiling on decoded inline payloads. Default: 8 MiB.
    pub max_inline_bytes: u64,

    /// Items larger than this skip the primary destination when a fallback
    /// credential is available. Default: 20 MiB (single-part upload limit).
    pub primary_max_upload_bytes: u64,

    /// Maximum source pages rendered per document. Default: 80.
    pub max_pages: usize,

    /// Rendering DPI. Range: 72–400. Default: 150.
    pub render_dpi: u32,

    /// Cap on either edge of a rendered page, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Whether and how documents are split into page images. Default: none.
    pub extract_mode: ExtractMode,

    /// Files processed concurrently per request, and process-wide worker
    /// slots. Default: 4.
    pub workers: usize,

    /// Longest wait for a worker slot before failing with `Busy`. Default: 30.
    pub worker_wait_secs: u64,

    /// Per-download timeout in seconds. Default: 45.
    pub download_timeout_secs: u64,

    /// Per-provider-call timeout in seconds. Default: 45.
    pub upload_timeout_secs: u64,

    /// LibreOffice conversion timeout in seconds. Default: 180.
    pub convert_timeout_secs: u64,

    /// Explicit LibreOffice binary; `None` searches `PATH`.
    pub soffice_path: Option<PathBuf>,

    /// Explicit pdfium library; `None` uses the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Primary destination API settings.
    pub workspace: WorkspaceConfig,

    /// Fallback destination API settings.
    pub drive: DriveConfig,

    /// OAuth proxy settings.
    pub oauth: OAuthConfig,
}

/// Primary (workspace) destination settings.
#[derive(Clone)]
pub struct WorkspaceConfig {
    /// API base URL. Default: `https://api.notion.com`.
    pub api_base: Url,
    /// `Notion-Version` header value. Default: `2022-06-28`.
    pub api_version: String,
    /// Deployment-wide integration token. When set it is always used and
    /// per-request bearer tokens are ignored for the primary destination.
    pub token: Option<String>,
}

/// Fallback (drive) destination settings.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Metadata API base URL. Default: `https://www.googleapis.com`.
    pub api_base: Url,
    /// Folder that receives fallback uploads. Default: `Notion Autopilot Media`.
    pub default_folder: String,
}

/// OAuth proxy settings.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Upstream authorize endpoint.
    pub authorize_url: Url,
    /// Upstream token endpoint.
    pub token_url: Url,
    /// Server-registered client id; overrides the caller's when set.
    pub client_id: Option<String>,
    /// Server-held client secret; used with `client_id` for Basic auth.
    pub client_secret: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowlist: Allowlist::new(
                DEFAULT_ALLOWED_HOSTS.iter().copied(),
                DEFAULT_ALLOWED_SUFFIXES.iter().copied(),
            ),
            max_download_bytes: 30 * MIB,
            max_inline_bytes: 8 * MIB,
            primary_max_upload_bytes: 20 * MIB,
            max_pages: 80,
            render_dpi: 150,
            max_rendered_pixels: 4000,
            extract_mode: ExtractMode::default(),
            workers: 4,
            worker_wait_secs: 30,
            download_timeout_secs: 45,
            upload_timeout_secs: 45,
            convert_timeout_secs: 180,
            soffice_path: None,
            pdfium_lib_path: None,
            workspace: WorkspaceConfig::default(),
            drive: DriveConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            api_base: static_url("https://api.notion.com"),
            api_version: "2022-06-28".to_string(),
            token: None,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: static_url("https://www.googleapis.com"),
            default_folder: "Notion Autopilot Media".to_string(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: static_url("https://api.notion.com/v1/oauth/authorize"),
            token_url: static_url("https://api.notion.com/v1/oauth/token"),
            client_id: None,
            client_secret: None,
        }
    }
}

// Only called with the literals above.
fn static_url(s: &str) -> Url {
    Url::parse(s).expect("static URL literal")
}

fn redacted(v: &Option<String>) -> Option<&'static str> {
    v.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("allowlist", &self.allowlist)
            .field("max_download_bytes", &self.max_download_bytes)
            .field("max_inline_bytes", &self.max_inline_bytes)
            .field("primary_max_upload_bytes", &self.primary_max_upload_bytes)
            .field("max_pages", &self.max_pages)
            .field("render_dpi", &self.render_dpi)
            .field("extract_mode", &self.extract_mode)
            .field("workers", &self.workers)
            .field("workspace", &self.workspace)
            .field("drive", &self.drive)
            .field("oauth", &self.oauth)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("api_base", &self.api_base.as_str())
            .field("api_version", &self.api_version)
            .field("token", &redacted(&self.token))
            .finish()
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .finish()
    }
}

impl BridgeConfig {
    /// Create a new builder for `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Replace the exact-host allowlist.
    pub fn allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowlist = self.config.allowlist.with_hosts(hosts);
        self
    }

    /// Replace the host-suffix allowlist.
    pub fn allowed_host_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowlist = self.config.allowlist.with_suffixes(suffixes);
        self
    }

    /// Accept plain-http download links. For local testing only.
    pub fn allow_insecure_http(mut self, v: bool) -> Self {
        self.config.allowlist = self.config.allowlist.allow_insecure_http(v);
        self
    }

    pub fn max_download_bytes(mut self, n: u64) -> Self {
        self.config.max_download_bytes = n;
        self
    }

    pub fn max_inline_bytes(mut self, n: u64) -> Self {
        self.config.max_inline_bytes = n;
        self
    }

    pub fn primary_max_upload_bytes(mut self, n: u64) -> Self {
        self.config.primary_max_upload_bytes = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn extract_mode(mut self, mode: ExtractMode) -> Self {
        self.config.extract_mode = mode;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn worker_wait_secs(mut self, secs: u64) -> Self {
        self.config.worker_wait_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn workspace_api_base(mut self, url: Url) -> Self {
        self.config.workspace.api_base = url;
        self
    }

    pub fn workspace_api_version(mut self, v: impl Into<String>) -> Self {
        self.config.workspace.api_version = v.into();
        self
    }

    pub fn workspace_token(mut self, token: impl Into<String>) -> Self {
        self.config.workspace.token = non_empty(token.into());
        self
    }

    pub fn drive_api_base(mut self, url: Url) -> Self {
        self.config.drive.api_base = url;
        self
    }

    pub fn drive_folder(mut self, name: impl Into<String>) -> Self {
        self.config.drive.default_folder = name.into();
        self
    }

    pub fn oauth_authorize_url(mut self, url: Url) -> Self {
        self.config.oauth.authorize_url = url;
        self
    }

    pub fn oauth_token_url(mut self, url: Url) -> Self {
        self.config.oauth.token_url = url;
        self
    }

    pub fn oauth_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.oauth.client_id = non_empty(id.into());
        self
    }

    pub fn oauth_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.oauth.client_secret = non_empty(secret.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        let c = &self.config;
        if c.render_dpi < 72 || c.render_dpi > 400 {
            return Err(invalid(format!("DPI must be 72–400, got {}", c.render_dpi)));
        }
        if c.max_download_bytes == 0 || c.max_inline_bytes == 0 {
            return Err(invalid("byte ceilings must be greater than zero".into()));
        }
        if c.max_pages == 0 {
            return Err(invalid("max_pages must be ≥ 1".into()));
        }
        if c.workers == 0 {
            return Err(invalid("workers must be ≥ 1".into()));
        }
        if c.allowlist.is_empty() {
            return Err(invalid(
                "download allowlist is empty; every download would be rejected".into(),
            ));
        }
        Ok(self.config)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn invalid(message: String) -> BridgeError {
    BridgeError::InvalidRequest {
        message: format!("invalid configuration: {message}"),
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Whether PDFs and presentations are split into page images before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Upload documents as-is. (default)
    #[default]
    None,
    /// One PNG per page.
    Page,
    /// Crop diagram-like regions from each page; full page when none found.
    Diagram,
}

impl ExtractMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ExtractMode::None)
    }
}

impl FromStr for ExtractMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" | "disabled" => Ok(ExtractMode::None),
            "page" | "pages" => Ok(ExtractMode::Page),
            "diagram" | "diagrams" | "crop" => Ok(ExtractMode::Diagram),
            other => Err(invalid(format!(
                "unknown extract mode '{other}' (expected none, page or diagram)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let c = BridgeConfig::default();
        assert_eq!(c.max_download_bytes, 30 * MIB);
        assert_eq!(c.max_inline_bytes, 8 * MIB);
        assert_eq!(c.max_pages, 80);
        assert_eq!(c.render_dpi, 150);
        assert_eq!(c.extract_mode, ExtractMode::None);
        assert_eq!(c.workspace.api_version, "2022-06-28");
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = BridgeConfig::builder().render_dpi(1000).build().unwrap();
        assert_eq!(c.render_dpi, 400);
        let c = BridgeConfig::builder().render_dpi(10).build().unwrap();
        assert_eq!(c.render_dpi, 72);
    }

    #[test]
    fn builder_rejects_zero_pages() {
        assert!(BridgeConfig::builder().max_pages(0).build().is_err());
    }

    #[test]
    fn builder_rejects_empty_allowlist() {
        let r = BridgeConfig::builder()
            .allowed_hosts(Vec::<String>::new())
            .allowed_host_suffixes(Vec::<String>::new())
            .build();
        assert!(r.is_err());
    }

    #[test]
    fn blank_secrets_are_ignored() {
        let c = BridgeConfig::builder()
            .workspace_token("   ")
            .oauth_client_secret("")
            .build()
            .unwrap();
        assert!(c.workspace.token.is_none());
        assert!(c.oauth.client_secret.is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = BridgeConfig::builder()
            .workspace_token("ntn_very_secret")
            .oauth_client_id("client-1")
            .oauth_client_secret("shh-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("ntn_very_secret"));
        assert!(!dbg.contains("shh-secret"));
        assert!(dbg.contains("client-1"));
    }

    #[test]
    fn extract_mode_parses() {
        assert_eq!("none".parse::<ExtractMode>().unwrap(), ExtractMode::None);
        assert_eq!("PAGE".parse::<ExtractMode>().unwrap(), ExtractMode::Page);
        assert_eq!(
            " diagram ".parse::<ExtractMode>().unwrap(),
            ExtractMode::Diagram
        );
        assert!("sideways".parse::<ExtractMode>().is_err());
    }
}
