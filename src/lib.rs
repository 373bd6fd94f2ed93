//! # media-bridge
//!
//! A file-ingestion bridge between a conversational agent platform and a
//! workspace/drive pair of storage providers.
//!
//! ## Why this crate?
//!
//! Agent platforms hand out files as short-lived download links or as
//! base64 payloads, while workspace APIs only accept direct multipart
//! uploads with a hard size limit. This crate fetches the file safely,
//! optionally splits PDFs and slide decks into page images, uploads each
//! item to the workspace, and falls back to a public drive link when the
//! workspace refuses an item for size or plan reasons.
//!
//! ## Pipeline Overview
//!
//! ```text
//! FileRef (link | base64)
//!  │
//!  ├─ 1. Gate      bounded worker pool, fail fast as busy
//!  ├─ 2. Fetch     allowlisted, size-capped download or inline decode
//!  ├─ 3. Convert   ppt/pptx → PDF via headless LibreOffice (optional)
//!  ├─ 4. Render    pdfium pages → PNG, optional diagram crops (spawn_blocking)
//!  ├─ 5. Dispatch  workspace upload, drive fallback on size/plan errors
//!  └─ 6. Output    one UploadResult per item, in input order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use media_bridge::{Bridge, BridgeConfig, DestinationHint, FileRef, Targets};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Bridge::new(BridgeConfig::default())?;
//!     let targets = Targets {
//!         primary: Some(Box::new(bridge.workspace_target("secret_token"))),
//!         fallback: None,
//!     };
//!     let files = [FileRef::External {
//!         url: "https://files.oaiusercontent.com/file-abc".into(),
//!         name: "report.pdf".into(),
//!         mime_type: "application/pdf".into(),
//!     }];
//!     for result in bridge.upload_files(&files, &targets, DestinationHint::Auto).await {
//!         println!("{} → {:?}", result.name, result.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `media-bridge` server binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! media-bridge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod limits;
pub mod oauth;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BridgeConfig, BridgeConfigBuilder, DriveConfig, ExtractMode, OAuthConfig, WorkspaceConfig};
pub use error::{BridgeError, ErrorClass, FileError, PageError, Provider};
pub use ingest::{Bridge, Targets};
pub use output::{batch_status, Destination, UploadResult, UploadStatus};
pub use pipeline::allowlist::Allowlist;
pub use pipeline::input::FileRef;
pub use server::router;
pub use upload::{DestinationHint, DriveUploader, StoredObject, UploadItem, UploadTarget, WorkspaceUploader};
