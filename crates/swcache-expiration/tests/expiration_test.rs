//! Expiration wired into runtime strategies
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use swcache_core::{
    CacheStorage, Fetcher, MatchOptions, MemoryCacheStorage, Request, StubFetcher, SwError,
    WorkerScope,
};
use swcache_expiration::{
    ExpirationConfig, ExpirationPlugin, FileTimestampStore, MemoryTimestampStore, TimestampStore,
};
use swcache_strategies::{CacheFirst, Strategy, StrategyConfig};
use tempfile::TempDir;
use url::Url;

fn scope_with(fetcher: &Arc<StubFetcher>, caches: &Arc<MemoryCacheStorage>) -> WorkerScope {
    WorkerScope::new(
        Url::parse("https://app.test/").unwrap(),
        Arc::clone(caches) as Arc<dyn CacheStorage>,
        Arc::clone(fetcher) as Arc<dyn Fetcher>,
    )
}

async fn cached_paths(caches: &MemoryCacheStorage, cache_name: &str) -> Vec<String> {
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
async fn test_max_entries_keeps_most_recent() {
    let fetcher = Arc::new(StubFetcher::new());
    let caches = Arc::new(MemoryCacheStorage::new());
    let scope = scope_with(&fetcher, &caches);
    let plugin = ExpirationPlugin::new(
        &scope,
        Arc::new(MemoryTimestampStore::new()),
        ExpirationConfig::new().with_max_entries(2),
    )
    .unwrap();
    let strategy = CacheFirst::new(
        scope,
        StrategyConfig::new()
            .with_cache_name("images")
            .with_plugin(Arc::new(plugin)),
    );

    for name in ["one", "two", "three"] {
        let url = format!("https://app.test/{name}.png");
        fetcher.respond_ok(&url, "png");
        let (response, completion) = strategy.handle_all(Request::get(&url).unwrap().into()).await;
        response.unwrap();
        completion.wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(
        cached_paths(&caches, "images").await,
        vec!["/two.png", "/three.png"]
    );
}

#[tokio::test]
async fn test_cache_hit_refreshes_timestamp() {
    let fetcher = Arc::new(StubFetcher::new());
    let caches = Arc::new(MemoryCacheStorage::new());
    let scope = scope_with(&fetcher, &caches);
    let plugin = ExpirationPlugin::new(
        &scope,
        Arc::new(MemoryTimestampStore::new()),
        ExpirationConfig::new().with_max_entries(2),
    )
    .unwrap();
    let strategy = CacheFirst::new(
        scope,
        StrategyConfig::new()
            .with_cache_name("images")
            .with_plugin(Arc::new(plugin)),
    );

    // one, two, one (hit), three: two is now the least recently used
    for name in ["one", "two", "one", "three"] {
        let url = format!("https://app.test/{name}.png");
        fetcher.respond_ok(&url, "png");
        let (response, completion) = strategy.handle_all(Request::get(&url).unwrap().into()).await;
        response.unwrap();
        completion.wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(
        cached_paths(&caches, "images").await,
        vec!["/one.png", "/three.png"]
    );
}

#[tokio::test]
async fn test_default_runtime_cache_cannot_be_expired() {
    let fetcher = Arc::new(StubFetcher::new());
    let caches = Arc::new(MemoryCacheStorage::new());
    let scope = scope_with(&fetcher, &caches);
    fetcher.respond_ok("https://app.test/a", "a");
    let plugin = ExpirationPlugin::new(
        &scope,
        Arc::new(MemoryTimestampStore::new()),
        ExpirationConfig::new().with_max_entries(2),
    )
    .unwrap();
    let strategy = CacheFirst::new(scope, StrategyConfig::new().with_plugin(Arc::new(plugin)));

    let (response, completion) = strategy
        .handle_all(Request::get("https://app.test/a").unwrap().into())
        .await;
    response.unwrap();
    assert!(matches!(
        completion.wait().await,
        Err(SwError::ExpireCustomCachesOnly)
    ));
}

#[tokio::test]
async fn test_quota_error_purges_managed_caches() {
    let fetcher = Arc::new(StubFetcher::new());
    let caches = Arc::new(MemoryCacheStorage::with_quota(8));
    let scope = scope_with(&fetcher, &caches);
    let plugin = ExpirationPlugin::new(
        &scope,
        Arc::new(MemoryTimestampStore::new()),
        ExpirationConfig::new()
            .with_max_entries(10)
            .with_purge_on_quota_error(true),
    )
    .unwrap();
    let strategy = CacheFirst::new(
        scope,
        StrategyConfig::new()
            .with_cache_name("images")
            .with_plugin(Arc::new(plugin)),
    );

    fetcher.respond_ok("https://app.test/small", "123456");
    fetcher.respond_ok("https://app.test/large", "123456");

    let (_, completion) = strategy
        .handle_all(Request::get("https://app.test/small").unwrap().into())
        .await;
    completion.wait().await.unwrap();
    assert!(caches.has("images").await.unwrap());

    let (response, completion) = strategy
        .handle_all(Request::get("https://app.test/large").unwrap().into())
        .await;
    assert_eq!(response.unwrap().body(), "123456");
    assert!(matches!(
        completion.wait().await,
        Err(SwError::QuotaExceeded)
    ));
    assert!(!caches.has("images").await.unwrap());
    assert_eq!(caches.usage_bytes(), 0);
}

#[tokio::test]
async fn test_file_store_keeps_timestamps_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("timestamps.json");
    let url = Url::parse("https://app.test/a").unwrap();

    {
        let fetcher = Arc::new(StubFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let scope = scope_with(&fetcher, &caches);
        let store = Arc::new(FileTimestampStore::open(&path).await.unwrap());
        let plugin =
            ExpirationPlugin::new(&scope, store, ExpirationConfig::new().with_max_entries(5))
                .unwrap();
        plugin
            .registry()
            .get_or_create("api")
            .unwrap()
            .update_timestamp(&url)
            .await
            .unwrap();
    }

    let store = FileTimestampStore::open(&path).await.unwrap();
    let records = store.scan_newest_first("api").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, "https://app.test/a");
    assert_eq!(records[0].id, "api|https://app.test/a");
}
