//! Presentation → PDF conversion through LibreOffice.
//!
//! The converter is an optional capability: a deployment without
//! LibreOffice still serves PDFs and plain files, and a presentation that
//! needs conversion fails with [`BridgeError::ConverterUnavailable`] instead
//! of being uploaded unconverted.
//!
//! Each invocation gets its own LibreOffice profile directory inside the
//! request's temp dir; concurrent `soffice` processes sharing the default
//! profile block on its lock.

use crate::error::BridgeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Binaries searched on `PATH`, in order.
const CANDIDATES: &[&str] = &["soffice", "libreoffice"];

/// Characters of converter output kept in error messages.
const OUTPUT_SNIPPET: usize = 500;

/// Converts a presentation into a PDF.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `input`, writing into `out_dir`; returns the produced PDF.
    async fn to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, BridgeError>;
}

/// LibreOffice headless converter.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl SofficeConverter {
    /// Use `binary` when given, otherwise search `PATH` at conversion time.
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    fn locate(&self) -> Result<PathBuf, BridgeError> {
        if let Some(path) = &self.binary {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(BridgeError::ConverterUnavailable)
            };
        }
        find_on_path(CANDIDATES).ok_or(BridgeError::ConverterUnavailable)
    }
}

/// First of `names` found as a file in a `PATH` directory.
fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for name in names {
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn snippet(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim()
        .chars()
        .take(OUTPUT_SNIPPET)
        .collect()
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, BridgeError> {
        let binary = self.locate()?;
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| BridgeError::Internal(format!("create conversion dir: {e}")))?;

        let profile = url::Url::from_directory_path(out_dir.join(".profile"))
            .map_err(|_| BridgeError::Internal("conversion dir is not absolute".into()))?;

        info!("Converting presentation with {}", binary.display());
        let child = Command::new(&binary)
            .arg(format!("-env:UserInstallation={profile}"))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!("Could not start {}: {}", binary.display(), e);
                BridgeError::ConverterUnavailable
            })?;

        // On timeout the future is dropped, which kills the child.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BridgeError::ConversionTimeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| BridgeError::ConversionFailed {
                detail: format!("converter did not complete: {e}"),
            })?;

        if !output.status.success() {
            return Err(BridgeError::ConversionFailed {
                detail: format!(
                    "exit {}; stdout={} stderr={}",
                    output.status,
                    snippet(&output.stdout),
                    snippet(&output.stderr)
                ),
            });
        }

        let pdf = first_pdf(out_dir).await?.ok_or_else(|| {
            // LibreOffice reports success without output on malformed input.
            BridgeError::ConversionFailed {
                detail: format!("no PDF produced. {}", snippet(&output.stdout)),
            }
        })?;
        debug!("Conversion produced {}", pdf.display());
        Ok(pdf)
    }
}

/// Lexicographically first `*.pdf` directly inside `dir`.
async fn first_pdf(dir: &Path) -> Result<Option<PathBuf>, BridgeError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| BridgeError::Internal(format!("read conversion dir: {e}")))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| BridgeError::Internal(format!("read conversion dir: {e}")))?
    {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}
