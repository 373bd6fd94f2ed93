//! HTTP server binary for media-bridge.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `BridgeConfig` and serves the router until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use media_bridge::{server, Bridge, BridgeConfig, ExtractMode};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve with a server-side workspace token
  NOTION_TOKEN=secret_... media-bridge

  # Split PDFs and decks into one PNG per page
  media-bridge --extract-mode page --max-pages 40

  # Print the effective configuration (credentials redacted) and exit
  media-bridge --check-config

ROUTES:
  GET  /health                               liveness check
  GET  /oauth/notion/authorize               302 to the consent page
  POST /oauth/notion/token                   token exchange proxy
  POST /v1/notion/file_uploads               upload from download links
  POST /v1/notion/file_uploads_from_data     upload from base64 payloads
  POST /v1/drive/upload_public               upload to drive, public link

CREDENTIALS:
  Authorization: Bearer <token>          workspace token (unless NOTION_TOKEN is set)
  X-Drive-Authorization: Bearer <token>  drive token for the fallback destination
"#;

/// Fetch, split and upload files for an agent platform.
#[derive(Parser, Debug)]
#[command(
    name = "media-bridge",
    version,
    about = "File-ingestion bridge: safe fetch, page extraction, workspace upload with drive fallback",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Socket address to listen on.
    #[arg(long, env = "MEDIA_BRIDGE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Server-side workspace integration token.
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    notion_token: Option<String>,

    /// Workspace API version header.
    #[arg(long, env = "NOTION_VERSION", default_value = "2022-06-28")]
    notion_version: String,

    /// Comma-separated exact hosts allowed as download origins.
    #[arg(long, env = "ALLOWED_DOWNLOAD_HOSTS")]
    allowed_hosts: Option<String>,

    /// Comma-separated host suffixes allowed as download origins.
    #[arg(long, env = "ALLOWED_DOWNLOAD_HOST_SUFFIXES")]
    allowed_host_suffixes: Option<String>,

    /// Accept plain-http download links (local testing only).
    #[arg(long, hide = true)]
    allow_insecure_http: bool,

    /// Ceiling on bytes fetched from a download link.
    #[arg(long, env = "MAX_DOWNLOAD_BYTES", default_value_t = 30 * 1024 * 1024)]
    max_download_bytes: u64,

    /// Ceiling on decoded inline payloads.
    #[arg(long, env = "MAX_INLINE_FILE_BYTES", default_value_t = 8 * 1024 * 1024)]
    max_inline_bytes: u64,

    /// Items above this size go straight to the drive when a drive token is present.
    #[arg(long, env = "MEDIA_BRIDGE_PRIMARY_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    primary_max_upload_bytes: u64,

    /// Page extraction: none, page or diagram.
    #[arg(long, env = "PDF_EXTRACT_MODE", default_value = "none")]
    extract_mode: ExtractMode,

    /// Maximum pages rendered per document.
    #[arg(long, env = "MAX_SLIDE_PAGES", default_value_t = 80)]
    max_pages: usize,

    /// Rendering DPI (72–400).
    #[arg(long, env = "SLIDE_RENDER_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Files processed concurrently across all requests.
    #[arg(long, env = "MEDIA_BRIDGE_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Seconds a file may wait for a free worker before failing as busy.
    #[arg(long, env = "MEDIA_BRIDGE_WORKER_WAIT", default_value_t = 30)]
    worker_wait: u64,

    /// Download timeout in seconds.
    #[arg(long, env = "MEDIA_BRIDGE_DOWNLOAD_TIMEOUT", default_value_t = 45)]
    download_timeout: u64,

    /// Per-call upload timeout in seconds.
    #[arg(long, env = "MEDIA_BRIDGE_UPLOAD_TIMEOUT", default_value_t = 45)]
    upload_timeout: u64,

    /// Office conversion timeout in seconds.
    #[arg(long, env = "MEDIA_BRIDGE_CONVERT_TIMEOUT", default_value_t = 180)]
    convert_timeout: u64,

    /// Path to the LibreOffice `soffice` binary. Default: looked up on PATH.
    #[arg(long, env = "MEDIA_BRIDGE_SOFFICE_PATH")]
    soffice_path: Option<PathBuf>,

    /// Path to libpdfium. Default: the system library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Default drive folder for fallback uploads.
    #[arg(long, env = "MEDIA_BRIDGE_DRIVE_FOLDER")]
    drive_folder: Option<String>,

    /// OAuth consent page.
    #[arg(long, env = "NOTION_OAUTH_AUTHORIZE_URL")]
    oauth_authorize_url: Option<Url>,

    /// OAuth token endpoint.
    #[arg(long, env = "NOTION_OAUTH_TOKEN_URL")]
    oauth_token_url: Option<Url>,

    /// OAuth client id injected into authorize redirects and token calls.
    #[arg(long, env = "NOTION_OAUTH_CLIENT_ID")]
    oauth_client_id: Option<String>,

    /// OAuth client secret.
    #[arg(long, env = "NOTION_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    oauth_client_secret: Option<String>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    check_config: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MEDIA_BRIDGE_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).context("Invalid configuration")?;

    if cli.check_config {
        println!("{config:#?}");
        return Ok(());
    }

    info!(
        "Extract mode {:?}, {} worker(s), allowlist {:?}",
        config.extract_mode, config.workers, config.allowlist
    );

    let bridge = Bridge::new(config).context("Failed to initialise bridge")?;
    let app = server::router(Arc::new(bridge));

    // ── Serve ────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!("Listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

fn build_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut b = BridgeConfig::builder()
        .allow_insecure_http(cli.allow_insecure_http)
        .max_download_bytes(cli.max_download_bytes)
        .max_inline_bytes(cli.max_inline_bytes)
        .primary_max_upload_bytes(cli.primary_max_upload_bytes)
        .extract_mode(cli.extract_mode)
        .max_pages(cli.max_pages)
        .render_dpi(cli.dpi)
        .workers(cli.workers)
        .worker_wait_secs(cli.worker_wait)
        .download_timeout_secs(cli.download_timeout)
        .upload_timeout_secs(cli.upload_timeout)
        .convert_timeout_secs(cli.convert_timeout)
        .workspace_api_version(cli.notion_version.clone());

    if let Some(ref hosts) = cli.allowed_hosts {
        b = b.allowed_hosts(split_csv(hosts));
    }
    if let Some(ref suffixes) = cli.allowed_host_suffixes {
        b = b.allowed_host_suffixes(split_csv(suffixes));
    }
    if let Some(ref token) = cli.notion_token {
        b = b.workspace_token(token.clone());
    }
    if let Some(ref p) = cli.soffice_path {
        b = b.soffice_path(p.clone());
    }
    if let Some(ref p) = cli.pdfium_lib_path {
        b = b.pdfium_lib_path(p.clone());
    }
    if let Some(ref folder) = cli.drive_folder {
        b = b.drive_folder(folder.clone());
    }
    if let Some(ref url) = cli.oauth_authorize_url {
        b = b.oauth_authorize_url(url.clone());
    }
    if let Some(ref url) = cli.oauth_token_url {
        b = b.oauth_token_url(url.clone());
    }
    if let Some(ref id) = cli.oauth_client_id {
        b = b.oauth_client_id(id.clone());
    }
    if let Some(ref secret) = cli.oauth_client_secret {
        b = b.oauth_client_secret(secret.clone());
    }

    Ok(b.build()?)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
