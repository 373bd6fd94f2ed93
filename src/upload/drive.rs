//! Fallback destination: a cloud drive folder with anyone-with-link sharing.
//!
//! Per object: upload into the folder, grant `anyone:reader`, then read back
//! the download and view links. The folder is looked up by name (and created
//! when missing) once per uploader, which is once per request.
//!
//! Calls go through the generated `google_drive3` client authenticated with
//! the caller's access token. The HTTPS client is built once per [`Bridge`]
//! and shared; each uploader wraps it in its own hub.
//!
//! When sharing or the metadata read fails after the object exists, the
//! object is deleted before the error is returned; otherwise every retry
//! would leave a private orphan in the caller's drive.
//!
//! [`Bridge`]: crate::Bridge

use super::{upstream_json_error, StoredObject, UploadItem, UploadTarget};
use crate::config::DriveConfig;
use crate::error::{redact, BridgeError, Provider};
use crate::pipeline::input::DEFAULT_MIME;
use async_trait::async_trait;
use google_drive3 as drive3;
use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use drive3::api::{File, Permission};
use drive3::hyper_util::client::legacy::connect::HttpConnector;
use drive3::DriveHub;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// TLS connector under the shared drive client.
pub type DriveConnector = drive3::hyper_rustls::HttpsConnector<HttpConnector>;

/// HTTP client handed to every [`DriveHub`].
pub type DriveClient = drive3::common::Client<DriveConnector>;

/// Build the shared drive client.
///
/// Plain http is accepted so the API base can point at a local mock.
pub fn drive_client() -> Result<DriveClient, BridgeError> {
    // rustls needs a process default once more than one backend is compiled in.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let connector = drive3::hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| BridgeError::Internal(format!("drive client roots: {e}")))?
        .https_or_http()
        .enable_http1()
        .build();
    Ok(
        drive3::hyper_util::client::legacy::Client::builder(
            drive3::hyper_util::rt::TokioExecutor::new(),
        )
        .build(connector),
    )
}

/// Public download URL for a file without a `webContentLink`.
pub fn public_download_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={file_id}")
}

/// Uploads into one drive folder with one OAuth access token.
pub struct DriveUploader {
    hub: DriveHub<DriveConnector>,
    root: String,
    token: String,
    folder_name: String,
    folder: OnceCell<String>,
    timeout: Duration,
}

impl fmt::Debug for DriveUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveUploader")
            .field("root", &self.root)
            .field("folder_name", &self.folder_name)
            .finish_non_exhaustive()
    }
}

impl DriveUploader {
    pub fn new(
        client: DriveClient,
        config: &DriveConfig,
        token: impl Into<String>,
        folder_name: Option<String>,
        timeout: Duration,
    ) -> Self {
        let token = token.into();
        let folder_name = folder_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| config.default_folder.clone());

        // Metadata calls go to `{root}drive/v3/`, uploads to `{root}upload/drive/v3/`.
        let root = format!("{}/", config.api_base.as_str().trim_end_matches('/'));
        let mut hub = DriveHub::new(client, token.clone());
        hub.root_url(root.clone());
        hub.base_url(format!("{root}drive/v3/"));

        Self {
            hub,
            root,
            token,
            folder_name,
            folder: OnceCell::new(),
            timeout,
        }
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Run one drive call under the per-call timeout.
    async fn call<T>(
        &self,
        fut: impl Future<Output = drive3::Result<T>>,
    ) -> Result<T, BridgeError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(drive_error(e, &self.token)),
            Err(_) => Err(BridgeError::UpstreamUnreachable {
                provider: Provider::Drive,
                reason: "request timed out".into(),
            }),
        }
    }

    async fn folder_id(&self) -> Result<&str, BridgeError> {
        self.folder
            .get_or_try_init(|| self.find_or_create_folder())
            .await
            .map(String::as_str)
    }

    async fn find_or_create_folder(&self) -> Result<String, BridgeError> {
        let escaped = self.folder_name.replace('\\', "\\\\").replace('\'', "\\'");
        let q = format!("mimeType='{FOLDER_MIME}' and name='{escaped}' and trashed=false");
        let (_, list) = self
            .call(
                self.hub
                    .files()
                    .list()
                    .q(&q)
                    .page_size(10)
                    .param("fields", "files(id,name)")
                    .doit(),
            )
            .await?;
        if let Some(id) = list.files.unwrap_or_default().into_iter().find_map(|f| f.id) {
            debug!("Using drive folder '{}' ({})", self.folder_name, id);
            return Ok(id);
        }

        let mut folder = File::default();
        folder.name = Some(self.folder_name.clone());
        folder.mime_type = Some(FOLDER_MIME.to_string());
        let (_, created) = self
            .call(
                self.hub
                    .files()
                    .create(folder)
                    .param("fields", "id")
                    .doit_without_upload(),
            )
            .await?;
        let id = created.id.ok_or(BridgeError::UnexpectedResponse {
            provider: Provider::Drive,
            detail: "folder creation returned no id".into(),
        })?;
        info!("Created drive folder '{}'", self.folder_name);
        Ok(id)
    }

    /// Share the object and read its links.
    async fn publish(&self, file_id: &str) -> Result<File, BridgeError> {
        let mut grant = Permission::default();
        grant.type_ = Some("anyone".to_string());
        grant.role = Some("reader".to_string());
        self.call(self.hub.permissions().create(grant, file_id).doit())
            .await?;

        let (_, meta) = self
            .call(
                self.hub
                    .files()
                    .get(file_id)
                    .param("fields", "id,name,webContentLink,webViewLink")
                    .doit(),
            )
            .await?;
        Ok(meta)
    }

    async fn delete_quietly(&self, file_id: &str) {
        match self.call(self.hub.files().delete(file_id).doit()).await {
            Ok(_) => debug!("Deleted unshared drive file {}", file_id),
            Err(e) => warn!("Could not delete unshared drive file {}: {}", file_id, e),
        }
    }
}

/// Map a drive client error to the bridge taxonomy.
fn drive_error(e: drive3::Error, token: &str) -> BridgeError {
    match e {
        drive3::Error::BadRequest(body) => {
            let status = body
                .pointer("/error/code")
                .and_then(serde_json::Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(400);
            upstream_json_error(Provider::Drive, status, &body, &[token])
        }
        drive3::Error::Failure(response) => {
            let status = response.status().as_u16();
            BridgeError::Upstream {
                provider: Provider::Drive,
                status,
                class: super::classify_status(status, ""),
                summary: format!("HTTP {status}"),
            }
        }
        drive3::Error::HttpError(e) => BridgeError::UpstreamUnreachable {
            provider: Provider::Drive,
            reason: redact(&e.to_string(), &[token]),
        },
        // The first field is the raw body; only the parse error is kept.
        drive3::Error::JsonDecodeError(_, e) => BridgeError::UnexpectedResponse {
            provider: Provider::Drive,
            detail: e.to_string(),
        },
        other => BridgeError::UnexpectedResponse {
            provider: Provider::Drive,
            detail: redact(&other.to_string(), &[token]),
        },
    }
}

#[async_trait]
impl UploadTarget for DriveUploader {
    fn provider(&self) -> Provider {
        Provider::Drive
    }

    async fn upload(&self, item: &UploadItem) -> Result<StoredObject, BridgeError> {
        let folder = self.folder_id().await?;

        let mut meta = File::default();
        meta.name = Some(item.name.clone());
        meta.parents = Some(vec![folder.to_string()]);
        let mime = match item.mime_type.parse() {
            Ok(mime) => mime,
            Err(_) => DEFAULT_MIME
                .parse()
                .map_err(|_| BridgeError::Internal("default media type".into()))?,
        };

        let (_, uploaded) = self
            .call(
                self.hub
                    .files()
                    .create(meta)
                    .supports_all_drives(true)
                    .param("fields", "id,webViewLink,webContentLink")
                    .upload(Cursor::new(item.bytes.clone()), mime),
            )
            .await?;
        let file_id = uploaded.id.ok_or(BridgeError::UnexpectedResponse {
            provider: Provider::Drive,
            detail: "upload returned no file id".into(),
        })?;

        let meta = match self.publish(&file_id).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Sharing drive file {} failed: {}", file_id, e);
                self.delete_quietly(&file_id).await;
                return Err(e);
            }
        };

        info!("Uploaded '{}' ({} bytes) to drive", item.name, item.len());
        Ok(StoredObject {
            public_url: Some(
                meta.web_content_link
                    .unwrap_or_else(|| public_download_url(&file_id)),
            ),
            web_view_url: meta.web_view_link.or(uploaded.web_view_link),
            id: file_id,
        })
    }
}
