//! Integration tests for the reqwest-backed fetcher.
//!
//! These tests run against a local wiremock server.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use swcache_core::{
    CacheMode, Fetcher, HttpFetcher, Request, RequestInit, RequestMode, ResponseType, SwError,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let _ = rustls::crypto::ring::default_provider().install_default();
    HttpFetcher::new(Url::parse(&server.uri()).expect("Mock server URI should parse"))
        .expect("Failed to build HTTP fetcher")
}

#[tokio::test]
async fn test_fetch_same_origin_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("console.log(1);", "text/javascript"),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    let request = Request::get(&format!("{}/app.js", server.uri())).unwrap();
    let response = fetcher.fetch(request, None).await.expect("fetch should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "console.log(1);");
    assert_eq!(response.header("content-type"), Some("text/javascript"));
    assert_eq!(response.response_type(), ResponseType::Basic);
    assert!(!response.redirected());
}

#[tokio::test]
async fn test_error_status_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    let request = Request::get(&format!("{}/missing", server.uri())).unwrap();
    let response = fetcher.fetch(request, None).await.unwrap();
    assert_eq!(response.status(), 404);
    assert!(!response.is_ok());
}

#[tokio::test]
async fn test_redirect_is_flagged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    let request = Request::get(&format!("{}/old", server.uri())).unwrap();
    let response = fetcher.fetch(request, None).await.unwrap();

    assert!(response.redirected());
    assert_eq!(response.url().unwrap().path(), "/new");
    assert_eq!(response.body(), "moved");
}

#[tokio::test]
async fn test_reload_mode_bypasses_http_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    let request = Request::get(&format!("{}/index.html", server.uri())).unwrap();
    let init = RequestInit {
        cache: Some(CacheMode::Reload),
        ..RequestInit::default()
    };
    let response = fetcher.fetch(request, Some(&init)).await.unwrap();
    assert_eq!(response.body(), "fresh");
}

#[tokio::test]
async fn test_integrity_is_enforced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lib.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    let good = format!("sha256-{}", STANDARD.encode(Sha256::digest(b"lib")));
    let request = Request::get(&format!("{}/lib.js", server.uri()))
        .unwrap()
        .with_integrity(Some(good));
    assert!(fetcher.fetch(request, None).await.is_ok());

    let bad = format!("sha256-{}", STANDARD.encode(Sha256::digest(b"other")));
    let request = Request::get(&format!("{}/lib.js", server.uri()))
        .unwrap()
        .with_integrity(Some(bad));
    let error = fetcher.fetch(request, None).await.unwrap_err();
    assert!(matches!(error, SwError::IntegrityMismatch { .. }));
}

#[tokio::test]
async fn test_cross_origin_no_cors_is_opaque() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/font.woff2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("font"))
        .mount(&server)
        .await;

    let _ = rustls::crypto::ring::default_provider().install_default();
    let fetcher = HttpFetcher::new(Url::parse("https://app.example.com/").unwrap()).unwrap();

    let request = Request::get(&format!("{}/font.woff2", server.uri()))
        .unwrap()
        .with_mode(RequestMode::NoCors);
    let response = fetcher.fetch(request, None).await.unwrap();
    assert_eq!(response.response_type(), ResponseType::Opaque);
    assert_eq!(response.status(), 0);
    assert!(response.body().is_empty());

    let request = Request::get(&format!("{}/font.woff2", server.uri())).unwrap();
    let response = fetcher.fetch(request, None).await.unwrap();
    assert_eq!(response.response_type(), ResponseType::Cors);
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let fetcher = HttpFetcher::new(Url::parse("http://127.0.0.1:9/").unwrap()).unwrap();
    let request = Request::get("http://127.0.0.1:9/unreachable").unwrap();
    let error = fetcher.fetch(request, None).await.unwrap_err();
    assert!(matches!(error, SwError::Network(_)));
}
