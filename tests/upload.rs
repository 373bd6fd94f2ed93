//! Workspace and drive uploaders against a mock provider API.

mod common;

use bytes::Bytes;
use media_bridge::upload::{dispatch, DispatchOutcome, UploadPolicy};
use media_bridge::{
    Bridge, BridgeError, ErrorClass, Provider, UploadItem, UploadTarget,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use std::time::Duration;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item(name: &str, mime: &str, len: usize) -> UploadItem {
    UploadItem {
        source_name: name.into(),
        name: name.into(),
        mime_type: mime.into(),
        bytes: Bytes::from(vec![7u8; len]),
    }
}

fn bridge(server: &MockServer) -> Bridge {
    Bridge::new(common::config_for(server).build().unwrap()).unwrap()
}

async fn mount_drive_success(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [{ "id": "folder-1" }] })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "drv-1",
            "webViewLink": "https://drive.google.com/file/d/drv-1/view"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/drv-1/permissions"))
        .and(body_partial_json(json!({ "type": "anyone", "role": "reader" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "anyoneWithLink" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/drv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "drv-1",
            "webContentLink": "https://drive.google.com/uc?id=drv-1&export=download",
            "webViewLink": "https://drive.google.com/file/d/drv-1/view"
        })))
        .mount(server)
        .await;
}

// ── Workspace ────────────────────────────────────────────────────────────

#[tokio::test]
async fn workspace_upload_creates_then_sends() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .and(header("authorization", "Bearer ntn_test"))
        .and(header("notion-version", "2022-06-28"))
        .and(body_partial_json(json!({
            "mode": "single_part",
            "filename": "chart.png",
            "content_type": "image/png"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "fu_123", "status": "pending" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads/fu_123/send"))
        .and(header("authorization", "Bearer ntn_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "fu_123", "status": "uploaded" })))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let target = bridge.workspace_target("ntn_test");
    let stored = target.upload(&item("chart.png", "image/png", 64)).await.unwrap();
    assert_eq!(stored.id, "fu_123");
    assert_eq!(stored.public_url, None);
}

#[tokio::test]
async fn workspace_error_is_classified_and_redacted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error",
            "status": 401,
            "code": "unauthorized",
            "message": "API token ntn_leaky is invalid."
        })))
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let err = bridge
        .workspace_target("ntn_leaky")
        .upload(&item("a.txt", "text/plain", 3))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permission);
    assert_eq!(err.http_status(), 401);
    let text = err.to_string();
    assert!(text.contains("unauthorized"));
    assert!(!text.contains("ntn_leaky"));
}

#[tokio::test]
async fn workspace_create_without_id_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let err = bridge
        .workspace_target("t")
        .upload(&item("a.txt", "text/plain", 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::UnexpectedResponse {
            provider: Provider::Workspace,
            ..
        }
    ));
}

// ── Drive ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn drive_upload_shares_publicly() {
    let server = MockServer::start().await;
    mount_drive_success(&server).await;

    let bridge = bridge(&server);
    let target = bridge.drive_target("ya29.drive", None);
    let stored = target.upload(&item("scan.pdf", "application/pdf", 128)).await.unwrap();
    assert_eq!(stored.id, "drv-1");
    assert_eq!(
        stored.public_url.as_deref(),
        Some("https://drive.google.com/uc?id=drv-1&export=download")
    );
    assert_eq!(
        stored.web_view_url.as_deref(),
        Some("https://drive.google.com/file/d/drv-1/view")
    );
}

#[tokio::test]
async fn drive_creates_missing_folder_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_partial_json(json!({
            "name": "Project X",
            "mimeType": "application/vnd.google-apps.folder"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-new" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "drv-1" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/drv-1/permissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/drv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "drv-1" })))
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let target = bridge.drive_target("tok", Some("Project X".into()));
    for _ in 0..2 {
        let stored = target.upload(&item("a.png", "image/png", 8)).await.unwrap();
        // No webContentLink: the public link is derived from the id.
        assert_eq!(
            stored.public_url.as_deref(),
            Some("https://drive.google.com/uc?export=download&id=drv-1")
        );
    }
}

#[tokio::test]
async fn drive_deletes_object_when_sharing_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [{ "id": "folder-1" }] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "drv-9" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/drv-9/permissions"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "Sharing is disabled by the domain administrator.",
                "errors": [{ "reason": "cannotShareTeamDriveWithNonGoogleAccounts" }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/drv-9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let err = bridge
        .drive_target("tok", None)
        .upload(&item("a.png", "image/png", 8))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permission);
    assert!(err.to_string().contains("Sharing is disabled"));
}

// ── Fallback ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn plan_limit_on_nine_mib_image_falls_back_to_drive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "fu_big" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads/fu_big/send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "status": 400,
            "code": "validation_error",
            "message": "The file size exceeds the limit for your workspace plan."
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_drive_success(&server).await;

    let bridge = bridge(&server);
    let primary = bridge.workspace_target("ntn");
    let fallback = bridge.drive_target("ya29", None);
    let big = item("diagram.png", "image/png", 9 * common::MIB);
    let policy = UploadPolicy::derive(
        media_bridge::DestinationHint::Auto,
        big.len(),
        bridge.config().primary_max_upload_bytes,
        true,
    );
    assert_eq!(policy, UploadPolicy::PrimaryWithFallback);

    let primary: &dyn UploadTarget = &primary;
    let fallback: &dyn UploadTarget = &fallback;
    match dispatch(Some(primary), Some(fallback), policy, &big).await {
        DispatchOutcome::Fallback {
            object,
            primary_error,
        } => {
            assert_eq!(object.id, "drv-1");
            assert!(object.public_url.is_some());
            assert_eq!(primary_error.map(|e| e.class()), Some(ErrorClass::SizeLimit));
        }
        other => panic!("expected fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn permission_error_does_not_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "object": "error",
            "status": 403,
            "code": "restricted_resource",
            "message": "Insufficient permissions for this endpoint."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "never" })))
        .expect(0)
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let primary = bridge.workspace_target("ntn");
    let fallback = bridge.drive_target("ya29", None);
    let small = item("note.txt", "text/plain", 10);
    let primary: &dyn UploadTarget = &primary;
    let fallback: &dyn UploadTarget = &fallback;

    match dispatch(
        Some(primary),
        Some(fallback),
        UploadPolicy::PrimaryWithFallback,
        &small,
    )
    .await
    {
        DispatchOutcome::Failed(e) => {
            assert_eq!(e.class(), ErrorClass::Permission);
            assert_eq!(e.http_status(), 403);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_primary_times_out_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "fu_slow" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "never" })))
        .expect(0)
        .mount(&server)
        .await;

    let bridge = Bridge::new(
        common::config_for(&server)
            .upload_timeout_secs(1)
            .build()
            .unwrap(),
    )
    .unwrap();
    let primary = bridge.workspace_target("ntn");
    let fallback = bridge.drive_target("ya29", None);
    let primary: &dyn UploadTarget = &primary;
    let fallback: &dyn UploadTarget = &fallback;

    match dispatch(
        Some(primary),
        Some(fallback),
        UploadPolicy::PrimaryWithFallback,
        &item("slow.png", "image/png", 16),
    )
    .await
    {
        DispatchOutcome::Failed(e) => {
            assert!(matches!(
                e,
                BridgeError::UpstreamUnreachable {
                    provider: Provider::Workspace,
                    ..
                }
            ));
            assert_eq!(e.class(), ErrorClass::Transient);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn primary_server_error_is_transient_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/file_uploads"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "never" })))
        .expect(0)
        .mount(&server)
        .await;

    let bridge = bridge(&server);
    let primary = bridge.workspace_target("ntn");
    let fallback = bridge.drive_target("ya29", None);
    let primary: &dyn UploadTarget = &primary;
    let fallback: &dyn UploadTarget = &fallback;

    match dispatch(
        Some(primary),
        Some(fallback),
        UploadPolicy::PrimaryWithFallback,
        &item("a.png", "image/png", 16),
    )
    .await
    {
        DispatchOutcome::Failed(e) => {
            assert_eq!(e.class(), ErrorClass::Transient);
            assert_eq!(e.http_status(), 503);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
