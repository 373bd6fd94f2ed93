//! Per-item upload results as returned to callers.

use crate::error::FileError;
use crate::upload::{DispatchOutcome, StoredObject, UploadItem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Failed,
}

/// Where an uploaded item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// The workspace; `file_upload_id` is set.
    Primary,
    /// The drive; `file_id` and `public_url` are set.
    Fallback,
}

/// Outcome for one uploaded (or failed) item.
///
/// One source file yields one result, or one per extracted page or crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub source_name: String,
    pub name: String,
    pub mime_type: String,
    pub status: UploadStatus,
    pub destination: Option<Destination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_upload_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_view_url: Option<String>,
    /// Why the primary was skipped for an item stored in the fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
}

impl UploadResult {
    fn base(source_name: &str, name: &str, mime_type: &str, status: UploadStatus) -> Self {
        Self {
            source_name: source_name.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            status,
            destination: None,
            file_upload_id: None,
            file_id: None,
            public_url: None,
            web_view_url: None,
            fallback_reason: None,
            error: None,
        }
    }

    /// Stored in the workspace.
    pub fn primary(item: &UploadItem, object: StoredObject) -> Self {
        Self {
            destination: Some(Destination::Primary),
            file_upload_id: Some(object.id),
            ..Self::base(&item.source_name, &item.name, &item.mime_type, UploadStatus::Uploaded)
        }
    }

    /// Stored in the drive.
    pub fn fallback(item: &UploadItem, object: StoredObject, reason: Option<String>) -> Self {
        Self {
            destination: Some(Destination::Fallback),
            file_id: Some(object.id),
            public_url: object.public_url,
            web_view_url: object.web_view_url,
            fallback_reason: reason,
            ..Self::base(&item.source_name, &item.name, &item.mime_type, UploadStatus::Uploaded)
        }
    }

    /// Not stored; `name` is the item (or page) that failed.
    pub fn failed(source_name: &str, name: &str, mime_type: &str, error: FileError) -> Self {
        Self {
            error: Some(error),
            ..Self::base(source_name, name, mime_type, UploadStatus::Failed)
        }
    }

    pub fn from_outcome(item: &UploadItem, outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Primary(object) => Self::primary(item, object),
            DispatchOutcome::Fallback {
                object,
                primary_error,
            } => Self::fallback(item, object, primary_error.map(|e| e.to_string())),
            DispatchOutcome::Failed(e) => Self::failed(
                &item.source_name,
                &item.name,
                &item.mime_type,
                e.to_file_error(),
            ),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == UploadStatus::Uploaded
    }
}

/// HTTP status for a batch: 200 when anything was stored, else the first
/// failure's status.
pub fn batch_status(results: &[UploadResult]) -> u16 {
    if results.is_empty() || results.iter().any(UploadResult::is_uploaded) {
        return 200;
    }
    results
        .iter()
        .find_map(|r| r.error.as_ref().map(|e| e.status))
        .unwrap_or(500)
}
