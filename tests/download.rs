//! Bounded download against local servers.

use media_bridge::pipeline::download::Downloader;
use media_bridge::{Allowlist, BridgeError, ErrorClass};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn local(max_bytes: u64) -> Downloader {
    Downloader::new(
        Allowlist::new(["127.0.0.1"], Vec::<&str>::new()).allow_insecure_http(true),
        max_bytes,
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn fetches_body_under_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello bridge".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = local(1024)
        .fetch(&format!("{}/files/notes.txt", server.uri()))
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"hello bridge");
}

#[tokio::test]
async fn declared_length_over_ceiling_is_size_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/big.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let err = local(1024)
        .fetch(&format!("{}/files/big.bin", server.uri()))
        .await
        .unwrap_err();
    match &err {
        BridgeError::DownloadTooLarge {
            limit, declared, ..
        } => {
            assert_eq!(*limit, 1024);
            assert_eq!(*declared, Some(4096));
        }
        other => panic!("expected DownloadTooLarge, got {other:?}"),
    }
    assert_eq!(err.class(), ErrorClass::SizeLimit);
    assert_eq!(err.http_status(), 413);
}

/// Serves one chunked response of `chunks` × 1 KiB without a Content-Length.
async fn chunked_server(chunks: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut req = [0u8; 2048];
        let _ = socket.read(&mut req).await;
        if socket
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }
        let chunk = vec![b'x'; 1024];
        for _ in 0..chunks {
            let frame = [b"400\r\n".as_slice(), chunk.as_slice(), b"\r\n".as_slice()].concat();
            if socket.write_all(&frame).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });
    format!("http://{addr}/stream")
}

#[tokio::test]
async fn streamed_body_over_ceiling_is_size_limit() {
    let url = chunked_server(64).await;

    let err = local(4096).fetch(&url).await.unwrap_err();
    assert!(
        matches!(err, BridgeError::DownloadTooLarge { declared: None, .. }),
        "got {err:?}"
    );
    assert_eq!(err.class(), ErrorClass::SizeLimit);
}

#[tokio::test]
async fn error_status_is_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = local(1024)
        .fetch(&format!("{}/files/expired?sig=abc123", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::DownloadFailed { .. }));
    assert_eq!(err.class(), ErrorClass::Transient);
    assert!(err.to_string().contains("404"));
    // Signed query strings never surface.
    assert!(!err.to_string().contains("abc123"));
}

#[tokio::test]
async fn redirect_to_unlisted_host_is_refused() {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/files/hop"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("http://localhost:{port}/internal").as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let err = local(1024)
        .fetch(&format!("{}/files/hop", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::RedirectNotAllowed { .. }), "got {err:?}");
}

#[tokio::test]
async fn redirect_within_allowlist_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/old"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/files/new", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let bytes = local(1024)
        .fetch(&format!("{}/files/old", server.uri()))
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"moved");
}
