//! Primary destination: the workspace file-upload API.
//!
//! Two calls per object: create a single-part upload, then send the bytes
//! as a multipart `file` field. The returned id is what the agent attaches
//! to pages and blocks.

use super::{endpoint, transport_error, upstream_error, StoredObject, UploadItem, UploadTarget};
use crate::config::WorkspaceConfig;
use crate::error::{BridgeError, Provider};
use crate::pipeline::input::DEFAULT_MIME;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Serialize)]
struct CreateUpload<'a> {
    mode: &'static str,
    filename: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct CreatedUpload {
    id: Option<String>,
}

/// Uploads to the workspace with one bearer token.
#[derive(Clone)]
pub struct WorkspaceUploader {
    client: reqwest::Client,
    base: Url,
    version: String,
    token: String,
    timeout: Duration,
}

impl fmt::Debug for WorkspaceUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceUploader")
            .field("base", &self.base.as_str())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl WorkspaceUploader {
    pub fn new(
        client: reqwest::Client,
        config: &WorkspaceConfig,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base: config.api_base.clone(),
            version: config.api_version.clone(),
            token: token.into(),
            timeout,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(endpoint(&self.base, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
            .timeout(self.timeout)
    }
}

fn file_part(item: &UploadItem) -> Part {
    Part::stream_with_length(item.bytes.clone(), item.len()).file_name(item.name.clone())
}

#[async_trait]
impl UploadTarget for WorkspaceUploader {
    fn provider(&self) -> Provider {
        Provider::Workspace
    }

    async fn upload(&self, item: &UploadItem) -> Result<StoredObject, BridgeError> {
        let secrets = [self.token.as_str()];

        let response = self
            .post("v1/file_uploads")
            .json(&CreateUpload {
                mode: "single_part",
                filename: &item.name,
                content_type: &item.mime_type,
            })
            .send()
            .await
            .map_err(|e| transport_error(Provider::Workspace, e))?;
        if !response.status().is_success() {
            return Err(upstream_error(Provider::Workspace, response, &secrets).await);
        }

        let created: CreatedUpload =
            response
                .json()
                .await
                .map_err(|e| BridgeError::UnexpectedResponse {
                    provider: Provider::Workspace,
                    detail: e.without_url().to_string(),
                })?;
        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or(BridgeError::UnexpectedResponse {
                provider: Provider::Workspace,
                detail: "no file upload id returned".into(),
            })?;
        debug!("Created file upload {} for '{}'", id, item.name);

        // A media type reqwest cannot parse is sent as octet-stream.
        let part = file_part(item)
            .mime_str(&item.mime_type)
            .or_else(|_| file_part(item).mime_str(DEFAULT_MIME))
            .map_err(|e| BridgeError::Internal(format!("multipart: {e}")))?;

        let response = self
            .post(&format!("v1/file_uploads/{id}/send"))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| transport_error(Provider::Workspace, e))?;
        if !response.status().is_success() {
            return Err(upstream_error(Provider::Workspace, response, &secrets).await);
        }

        info!("Uploaded '{}' ({} bytes) to workspace", item.name, item.len());
        Ok(StoredObject {
            id,
            public_url: None,
            web_view_url: None,
        })
    }
}
