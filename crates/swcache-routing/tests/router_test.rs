//! Router dispatching to real strategies
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use http::Method;
use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use swcache_core::{
    CacheStorage, Fetcher, HandlerEvent, MatchOptions, MemoryCacheStorage, Request, StubFetcher,
    SwError, WorkerScope,
};
use swcache_routing::{Capture, Router, RouterMessage};
use swcache_strategies::{CacheFirst, NetworkOnly, StrategyConfig};
use tokio::sync::oneshot;
use url::Url;

struct Fixture {
    fetcher: Arc<StubFetcher>,
    caches: Arc<MemoryCacheStorage>,
    router: Router,
}

fn fixture() -> Fixture {
    let origin = Url::parse("https://app.test/").unwrap();
    let fetcher = Arc::new(StubFetcher::new());
    let caches = Arc::new(MemoryCacheStorage::new());
    let scope = WorkerScope::new(
        origin.clone(),
        Arc::clone(&caches) as Arc<dyn CacheStorage>,
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
    );
    let router = Router::new(origin);
    router
        .register_capture(
            Capture::Regex(Regex::new(r"/assets/").unwrap()),
            Arc::new(CacheFirst::new(
                scope.clone(),
                StrategyConfig::new().with_cache_name("assets"),
            )),
            Method::GET,
        )
        .unwrap();
    router.set_default_handler(
        Arc::new(NetworkOnly::new(scope, StrategyConfig::new())),
        Method::GET,
    );
    Fixture {
        fetcher,
        caches,
        router,
    }
}

// Cache writes finish in the background after the response is returned
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn cached(caches: &MemoryCacheStorage, cache_name: &str) -> Vec<String> {
    caches
        .open(cache_name)
        .await
        .unwrap()
        .keys(None, &MatchOptions::default())
        .await
        .unwrap()
        .iter()
        .map(|request| request.url().path().to_string())
        .collect()
}

#[tokio::test]
async fn test_matched_route_caches_and_default_handler_does_not() {
    let f = fixture();
    f.fetcher.respond_ok("https://app.test/assets/app.js", "js");
    f.fetcher.respond_ok("https://app.test/api/me", "me");

    for _ in 0..2 {
        let response = f
            .router
            .handle_request(
                Request::get("https://app.test/assets/app.js").unwrap(),
                HandlerEvent::fetch(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.body(), "js");
        settle().await;
    }
    assert_eq!(f.fetcher.call_count("https://app.test/assets/app.js"), 1);

    let response = f
        .router
        .handle_request(
            Request::get("https://app.test/api/me").unwrap(),
            HandlerEvent::fetch(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body(), "me");
    assert_eq!(cached(&f.caches, "assets").await, vec!["/assets/app.js"]);
}

#[tokio::test]
async fn test_cache_urls_message_warms_cache_and_replies() {
    let f = fixture();
    f.fetcher.respond_ok("https://app.test/assets/a.css", "a");
    f.fetcher.respond_ok("https://app.test/assets/b.css", "b");

    let message = RouterMessage::from_json(json!({
        "type": "CACHE_URLS",
        "payload": {
            "urlsToCache": [
                "/assets/a.css",
                ["/assets/b.css", {"headers": {"x-warm": "1"}}]
            ]
        }
    }))
    .unwrap();
    let (reply, replied) = oneshot::channel();
    f.router.handle_message(message, Some(reply)).await.unwrap();

    assert!(replied.await.unwrap());
    settle().await;
    let mut paths = cached(&f.caches, "assets").await;
    paths.sort();
    assert_eq!(paths, vec!["/assets/a.css", "/assets/b.css"]);

    let warmed = f
        .fetcher
        .calls()
        .into_iter()
        .find(|r| r.url().path() == "/assets/b.css")
        .unwrap();
    assert_eq!(
        warmed.headers().get("x-warm").and_then(|v| v.to_str().ok()),
        Some("1")
    );
}

#[tokio::test]
async fn test_cache_urls_failure_sends_no_reply() {
    let f = fixture();
    f.fetcher.respond_ok("https://app.test/assets/a.css", "a");

    let message = RouterMessage::from_json(json!({
        "type": "CACHE_URLS",
        "payload": {"urlsToCache": ["/assets/a.css", "/assets/missing.css"]}
    }))
    .unwrap();
    let (reply, replied) = oneshot::channel();
    let result = f.router.handle_message(message, Some(reply)).await;

    assert!(matches!(result, Err(SwError::NoResponse { .. })));
    assert!(replied.await.is_err());
}

#[tokio::test]
async fn test_skip_waiting_is_accepted() {
    let f = fixture();
    f.router
        .handle_message(RouterMessage::SkipWaiting, None)
        .await
        .unwrap();
    assert!(f.fetcher.calls().is_empty());
}

#[test]
fn test_unparseable_capture_url() {
    let f = fixture();
    let handler = f.router.routes(&Method::GET)[0].handler().clone();
    let result = f.router.register_capture(
        Capture::Url("https://[bad".into()),
        handler,
        Method::GET,
    );
    assert!(matches!(result, Err(SwError::UnsupportedRouteType { .. })));
}
