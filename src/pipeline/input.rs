//! Input resolution: turn a [`FileRef`] into a [`FetchedFile`].
//!
//! External references go through the allowlist and the bounded downloader;
//! inline references go through the inline decoder. Either way the result is
//! an in-memory payload already proven to be under its ceiling, owned by the
//! request that produced it.

use crate::error::BridgeError;
use crate::pipeline::download::Downloader;
use crate::pipeline::inline::decode_inline;
use bytes::Bytes;

/// Default media type when the caller does not declare one.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// One file named in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// A short-lived link issued by the agent platform.
    External {
        url: String,
        name: String,
        mime_type: String,
    },
    /// Bytes supplied directly in the request, base64-encoded.
    Inline {
        name: String,
        mime_type: String,
        data_base64: String,
    },
}

impl FileRef {
    pub fn name(&self) -> &str {
        match self {
            FileRef::External { name, .. } | FileRef::Inline { name, .. } => name,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            FileRef::External { mime_type, .. } | FileRef::Inline { mime_type, .. } => mime_type,
        }
    }
}

/// A payload that passed every origin and size check.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl FetchedFile {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fetch or decode `file`.
pub async fn resolve(
    file: &FileRef,
    downloader: &Downloader,
    max_inline_bytes: u64,
) -> Result<FetchedFile, BridgeError> {
    let bytes = match file {
        FileRef::External { url, .. } => downloader.fetch(url).await?,
        FileRef::Inline {
            name, data_base64, ..
        } => decode_inline(name, data_base64, max_inline_bytes)?,
    };

    Ok(FetchedFile {
        name: file.name().to_string(),
        mime_type: file.mime_type().to_string(),
        bytes,
    })
}
