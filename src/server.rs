//! HTTP surface of the bridge.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness (returns version) |
//! | `GET`  | `/oauth/notion/authorize` | 302 to the workspace consent page |
//! | `POST` | `/oauth/notion/token` | Token exchange proxy |
//! | `POST` | `/v1/notion/file_uploads` | Upload files referenced by download link |
//! | `POST` | `/v1/notion/file_uploads_from_data` | Upload base64 inline files |
//! | `POST` | `/v1/drive/upload_public` | Upload to the drive and share publicly |
//!
//! # Error Contract
//!
//! Request-level failures (bad body, no files, missing credential) answer
//! with
//!
//! ```json
//! { "error": { "code": "validation", "message": "No inline files provided." } }
//! ```
//!
//! where `code` is the error class. Per-file failures are reported inside
//! the result list instead; the batch answers 200 when at least one item
//! was stored and otherwise takes the status of the first failure.
//!
//! # Credentials
//!
//! Workspace: the server's `NOTION_TOKEN` when configured, else the
//! request's `Authorization: Bearer`. Drive: `X-Drive-Authorization:
//! Bearer`, or the request's `Authorization: Bearer` on the drive route and
//! whenever the workspace uses the server token.

use crate::error::{BridgeError, ErrorClass, Provider};
use crate::ingest::{Bridge, Targets};
use crate::oauth::{authorize_redirect, TokenExchange, TokenRequest};
use crate::output::{batch_status, UploadResult};
use crate::pipeline::input::{FileRef, DEFAULT_MIME};
use crate::upload::{DestinationHint, UploadTarget};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Header carrying the drive access token next to a workspace token.
pub const DRIVE_AUTH_HEADER: &str = "x-drive-authorization";

/// Shared state for every handler.
#[derive(Clone)]
struct AppState {
    bridge: Arc<Bridge>,
}

/// Build the router.
pub fn router(bridge: Arc<Bridge>) -> Router {
    // Inline payloads are base64 (4/3 of the decoded ceiling) and a request
    // may carry several of them.
    let body_limit = usize::try_from(bridge.config().max_inline_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(4)
        .saturating_add(1024 * 1024);

    Router::new()
        .route("/health", get(handle_health))
        .route("/oauth/notion/authorize", get(handle_authorize))
        .route("/oauth/notion/token", post(handle_token))
        .route("/v1/notion/file_uploads", post(handle_file_uploads))
        .route("/v1/notion/file_uploads_from_data", post(handle_file_uploads_from_data))
        .route("/v1/drive/upload_public", post(handle_drive_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { bridge })
}

// ── Error response ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.class() {
            ErrorClass::Processing => error!("Request failed: {}", self),
            ErrorClass::Transient | ErrorClass::Permission | ErrorClass::Capability => {
                warn!("Request failed: {}", self)
            }
            ErrorClass::Validation | ErrorClass::SizeLimit => debug!("Request rejected: {}", self),
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.class().as_str(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> BridgeError {
    BridgeError::InvalidRequest {
        message: message.into(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn handle_authorize(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let url = authorize_redirect(&state.bridge.config().oauth, query.as_deref());
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

async fn handle_token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let config = state.bridge.config();
    let exchange = TokenExchange {
        client: state.bridge.http_client(),
        config: &config.oauth,
        api_version: &config.workspace.api_version,
        timeout: Duration::from_secs(config.upload_timeout_secs),
    };
    let answer = exchange
        .exchange(TokenRequest {
            content_type: header_str(&headers, header::CONTENT_TYPE.as_str()),
            authorization: header_str(&headers, header::AUTHORIZATION.as_str()),
            body: &body,
        })
        .await;
    let status = StatusCode::from_u16(answer.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(answer.body)).into_response()
}

async fn handle_file_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BridgeError> {
    let body = parse_object(&body)?;
    let files = reference_files(&body, true)?;
    let hint = destination_hint(&body)?;
    let targets = workspace_targets(&state.bridge, &headers, hint, folder_name(&body))?;
    let results = state.bridge.upload_files(&files, &targets, hint).await;
    Ok(batch_response("uploads", results))
}

async fn handle_file_uploads_from_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BridgeError> {
    let body = parse_object(&body)?;
    let files = inline_files(&body, true)?;
    let hint = destination_hint(&body)?;
    let targets = workspace_targets(&state.bridge, &headers, hint, folder_name(&body))?;
    let results = state.bridge.upload_files(&files, &targets, hint).await;
    Ok(batch_response("uploads", results))
}

async fn handle_drive_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BridgeError> {
    let token = bearer(&headers, DRIVE_AUTH_HEADER)
        .or_else(|| bearer(&headers, header::AUTHORIZATION.as_str()))
        .ok_or_else(|| BridgeError::MissingCredential {
            provider: Provider::Drive,
            hint: "provide Authorization: Bearer <google_access_token>".into(),
        })?;

    let body = parse_object(&body)?;
    let mut files = reference_files(&body, false)?;
    files.extend(inline_files(&body, false)?);
    if files.is_empty() {
        return Err(bad_request(
            "No files received. Provide openaiFileIdRefs or files with at least one item.",
        ));
    }

    let targets = Targets {
        primary: None,
        fallback: Some(Box::new(
            state.bridge.drive_target(token, folder_name(&body)),
        )),
    };
    let results = state
        .bridge
        .upload_files(&files, &targets, DestinationHint::Fallback)
        .await;
    Ok(batch_response("files", results))
}

fn batch_response(key: &str, results: Vec<UploadResult>) -> Response {
    let status = StatusCode::from_u16(batch_status(&results)).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(json!({ key: results }))).into_response()
}

// ── Credentials ──────────────────────────────────────────────────────────

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Token from a `Bearer` header; `None` for other schemes or blanks.
fn bearer(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = header_str(headers, name)?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn workspace_targets(
    bridge: &Bridge,
    headers: &HeaderMap,
    hint: DestinationHint,
    folder: Option<String>,
) -> Result<Targets, BridgeError> {
    let request_bearer = bearer(headers, header::AUTHORIZATION.as_str());
    let server_token = bridge.config().workspace.token.clone();
    let uses_server_token = server_token.is_some();

    // The server token wins so that unrelated bearer tokens are never
    // forwarded to the workspace.
    let primary_token = server_token.or_else(|| request_bearer.clone());
    let drive_token = bearer(headers, DRIVE_AUTH_HEADER).or(if uses_server_token {
        request_bearer
    } else {
        None
    });

    if primary_token.is_none() && !(hint == DestinationHint::Fallback && drive_token.is_some()) {
        return Err(BridgeError::MissingCredential {
            provider: Provider::Workspace,
            hint: "provide Authorization: Bearer <notion_token> or configure NOTION_TOKEN".into(),
        });
    }

    Ok(Targets {
        primary: primary_token
            .map(|t| Box::new(bridge.workspace_target(t)) as Box<dyn UploadTarget>),
        fallback: drive_token.map(|t| {
            Box::new(bridge.drive_target(t, folder)) as Box<dyn UploadTarget>
        }),
    })
}

// ── Request bodies ───────────────────────────────────────────────────────

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, BridgeError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(bad_request("Request body must be a JSON object.")),
    }
}

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn folder_name(body: &Map<String, Value>) -> Option<String> {
    string_field(body, "folder_name").map(str::to_string)
}

fn destination_hint(body: &Map<String, Value>) -> Result<DestinationHint, BridgeError> {
    match body.get("destination") {
        None | Some(Value::Null) => Ok(DestinationHint::Auto),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| bad_request("destination must be one of: auto, primary, fallback.")),
    }
}

/// `openaiFileIdRefs` → external references. With `required`, an absent
/// or empty list is an error.
fn reference_files(
    body: &Map<String, Value>,
    required: bool,
) -> Result<Vec<FileRef>, BridgeError> {
    let refs = match body.get("openaiFileIdRefs") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(bad_request("openaiFileIdRefs must be an array.")),
    };
    if refs.is_empty() && required {
        return Err(bad_request(
            "No files received. Attach at least one file in chat and call the action with openaiFileIdRefs.",
        ));
    }

    refs.iter()
        .map(|item| {
            let obj = item
                .as_object()
                .ok_or_else(|| bad_request("openaiFileIdRefs must contain objects at runtime."))?;
            let url = string_field(obj, "download_link")
                .ok_or_else(|| bad_request("Missing download_link in openaiFileIdRefs item."))?;
            Ok(FileRef::External {
                url: url.to_string(),
                name: string_field(obj, "name").unwrap_or("upload").to_string(),
                mime_type: string_field(obj, "mime_type").unwrap_or(DEFAULT_MIME).to_string(),
            })
        })
        .collect()
}

/// `files` → inline payloads, named `inline_{n}` when unnamed.
fn inline_files(body: &Map<String, Value>, required: bool) -> Result<Vec<FileRef>, BridgeError> {
    let files = match body.get("files") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(bad_request("files must be an array.")),
    };
    if files.is_empty() && required {
        return Err(bad_request("No inline files provided."));
    }

    files
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| bad_request(format!("files[{idx}] must be an object.")))?;
            let data = string_field(obj, "data_base64")
                .ok_or_else(|| bad_request(format!("files[{idx}].data_base64 is required.")))?;
            Ok(FileRef::Inline {
                name: string_field(obj, "name")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("inline_{}", idx + 1)),
                mime_type: string_field(obj, "mime_type").unwrap_or(DEFAULT_MIME).to_string(),
                data_base64: data.to_string(),
            })
        })
        .collect()
}
