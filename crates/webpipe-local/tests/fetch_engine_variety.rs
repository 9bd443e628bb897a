//! Exercises `LocalFetcher` against a local `axum` server covering the
//! classification ladder (spec §4.2) without touching the live network.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use webpipe_core::{Classification, FetchBackend, FetchOptions};
use webpipe_local::{FsCache, LocalFetcher};

async fn spawn_server() -> String {
    let app = Router::new()
        .route(
            "/html",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    "<html><body><p>hello there, this is a perfectly ordinary page</p></body></html>",
                )
                    .into_response()
            }),
        )
        .route(
            "/octet-html",
            get(|| async {
                // Declared type is ambiguous; sniffing should promote it to text/html.
                (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    "<!doctype html><html><body>sniffed</body></html>",
                )
                    .into_response()
            }),
        )
        .route(
            "/json",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"{"ok":true}"#,
                )
                    .into_response()
            }),
        )
        .route(
            "/notfound",
            get(|| async { (StatusCode::NOT_FOUND, "nope").into_response() }),
        )
        .route(
            "/blocked",
            get(|| async { (StatusCode::FORBIDDEN, "forbidden").into_response() }),
        )
        .route(
            "/rate_limited",
            get(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, "7")],
                    "rate limited",
                )
                    .into_response()
            }),
        )
        .route(
            "/server_error",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
        )
        .route(
            "/js_challenge",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><body>Please enable javascript and checking your browser before continuing.</body></html>",
                )
                    .into_response()
            }),
        )
        .route(
            "/tiny_spa_shell",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><head><script src=\"/app.js\"></script></head><body><div id=\"root\"></div></body></html>",
                )
                    .into_response()
            }),
        )
        .route(
            "/consent",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><body><form>We use cookies. <button>Accept all cookies</button></form></body></html>",
                )
                    .into_response()
            }),
        )
        .route(
            "/redirect",
            get(|| async {
                (StatusCode::FOUND, [(header::LOCATION, "/html")], "").into_response()
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fetcher(tmp: &std::path::Path) -> LocalFetcher {
    let cache = Arc::new(FsCache::new(tmp.to_path_buf(), 10_000_000));
    LocalFetcher::new(cache, 3600, None).unwrap()
}

#[tokio::test]
async fn ok_html_is_classified_ok_and_cached_on_second_fetch() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let options = FetchOptions::default();

    let first = f.fetch(&format!("{base}/html"), &options).await.unwrap();
    assert_eq!(first.classification, Classification::Ok);
    let artifact = first.document.artifact.as_ref().expect("artifact present");
    assert_eq!(artifact.content_type, "text/html; charset=utf-8");

    let second = f.fetch(&format!("{base}/html"), &options).await.unwrap();
    assert_eq!(second.classification, Classification::Ok);
    let second_artifact = second.document.artifact.as_ref().expect("artifact present");
    // Idempotence under cache hit (spec §8): identical body_path across calls.
    assert_eq!(artifact.body_path, second_artifact.body_path);
    assert!(!second_artifact.body_path.is_empty());
}

#[tokio::test]
async fn sniffing_promotes_octet_stream_to_html() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/octet-html"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::Ok);
    assert_eq!(result.document.artifact.unwrap().content_type, "text/html");
}

#[tokio::test]
async fn not_found_is_classified_not_found() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/notfound"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::NotFound);
}

#[tokio::test]
async fn forbidden_status_is_classified_blocked() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/blocked"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::Blocked);
    assert_eq!(result.reason, "http_403");
}

#[tokio::test]
async fn rate_limited_status_is_classified_blocked() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/rate_limited"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::Blocked);
    assert_eq!(result.reason, "http_429");
}

#[tokio::test]
async fn server_error_is_classified_transport_error() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/server_error"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::TransportError);
}

#[tokio::test]
async fn js_challenge_text_needs_render() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/js_challenge"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::NeedsRender);
    assert_eq!(result.reason, "js_challenge_text");
}

#[tokio::test]
async fn tiny_script_only_body_needs_render() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/tiny_spa_shell"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::NeedsRender);
    assert_eq!(result.reason, "tiny_body_with_script");
}

#[tokio::test]
async fn consent_wall_with_form_is_blocked() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/consent"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::Blocked);
    assert_eq!(result.reason, "consent_wall");
}

#[tokio::test]
async fn detect_blocks_disabled_yields_ok_status_only() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let mut options = FetchOptions::default();
    options.detect_blocks = false;
    let result = f.fetch(&format!("{base}/js_challenge"), &options).await.unwrap();
    assert_eq!(result.classification, Classification::Ok);
}

#[tokio::test]
async fn redirect_is_followed_and_final_url_recorded() {
    let base = spawn_server().await;
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let result = f.fetch(&format!("{base}/redirect"), &FetchOptions::default()).await.unwrap();
    assert_eq!(result.classification, Classification::Ok);
    let http = result.document.http.expect("http metadata present");
    assert_eq!(http.final_url, format!("{base}/html"));
    assert_eq!(http.redirect_chain, vec![format!("{base}/redirect")]);
}

#[tokio::test]
async fn forbidden_request_header_is_rejected_before_any_request() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fetcher(tmp.path());
    let mut options = FetchOptions::default();
    options.headers.insert("Authorization".to_string(), "Bearer x".to_string());
    let err = f.fetch("http://127.0.0.1:1/unreachable", &options).await.unwrap_err();
    assert_eq!(err.code(), "invalid_usage");
}
