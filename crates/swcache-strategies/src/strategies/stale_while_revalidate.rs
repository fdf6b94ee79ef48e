//! Network-then-cache race with cache preference

use crate::{
    handler::StrategyHandler,
    plugin::{CacheOkAndOpaquePlugin, PluginHook},
    strategy::{Strategy, StrategyConfig, StrategyCore},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use swcache_core::{Request, Response, SwError, SwResult, WorkerScope};
use tokio::sync::oneshot;

/// Starts a network fetch that refreshes the cache, and answers from the
/// cache when it has an entry. Without a cached entry the network result is
/// used.
///
/// A `network_timeout` bounds how long a cache miss waits for the network;
/// past it the request fails with a no-response error while the fetch keeps
/// running in the background.
pub struct StaleWhileRevalidate {
    core: Arc<StrategyCore>,
    network_timeout: Option<Duration>,
}

impl StaleWhileRevalidate {
    pub fn new(scope: WorkerScope, config: StrategyConfig) -> Self {
        let core = StrategyCore::runtime(scope, config);
        if !core.has_plugin_for(PluginHook::CacheWillUpdate) {
            core.prepend_plugin(Arc::new(CacheOkAndOpaquePlugin));
        }
        Self {
            core: Arc::new(core),
            network_timeout: None,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn core(&self) -> &Arc<StrategyCore> {
        &self.core
    }

    async fn respond(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        let (tx, rx) = oneshot::channel();
        let revalidate = Arc::clone(handler);
        let network_request = request.clone();
        handler.spawn_lifetime(async move {
            let _ = tx.send(revalidate.fetch_and_cache_put(network_request).await);
            Ok(())
        });

        if let Some(cached) = handler.cache_match(request.clone()).await? {
            tracing::debug!("Serving {} from cache while revalidating", request.url());
            return Ok(cached);
        }

        let network = match self.network_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx).await.ok(),
            None => Some(rx.await),
        };

        match network {
            Some(Ok(Ok(response))) => Ok(response),
            Some(Ok(Err(error))) => Err(SwError::NoResponse {
                url: request.url().to_string(),
                source: Some(Box::new(error)),
            }),
            Some(Err(_)) => Err(SwError::no_response(request.url().as_str())),
            None => {
                tracing::debug!("Network timed out for {}", request.url());
                Err(SwError::no_response(request.url().as_str()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::strategy::HandlerOptions;
    use swcache_core::{CacheStorage, MemoryCacheStorage, StubFetcher, StubOutcome};
    use url::Url;

    fn setup() -> (Arc<StubFetcher>, Arc<MemoryCacheStorage>, WorkerScope) {
        let fetcher = Arc::new(StubFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let scope = WorkerScope::new(
            Url::parse("https://example.com/").unwrap(),
            Arc::clone(&caches) as Arc<dyn CacheStorage>,
            Arc::clone(&fetcher) as Arc<dyn swcache_core::Fetcher>,
        );
        (fetcher, caches, scope)
    }

    #[tokio::test]
    async fn test_prefers_cache_and_revalidates() {
        let (fetcher, caches, scope) = setup();
        fetcher.respond_ok("https://example.com/data", "fresh");
        let cache = caches.open("api").await.unwrap();
        let request = Request::get("https://example.com/data").unwrap();
        cache.put(&request, Response::ok("stale")).await.unwrap();

        let strategy =
            StaleWhileRevalidate::new(scope, StrategyConfig::new().with_cache_name("api"));
        let (response, completion) = strategy.handle_all(HandlerOptions::new(request.clone())).await;
        assert_eq!(response.unwrap().body(), "stale");

        completion.wait().await.unwrap();
        let refreshed = cache
            .match_request(&request, &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.body(), "fresh");
    }

    #[tokio::test]
    async fn test_uses_network_on_cache_miss() {
        let (fetcher, _caches, scope) = setup();
        fetcher.respond_ok("https://example.com/data", "fresh");
        let strategy = StaleWhileRevalidate::new(scope, StrategyConfig::new());

        let response = strategy
            .handle(Request::get("https://example.com/data").unwrap().into())
            .await
            .unwrap();
        assert_eq!(response.body(), "fresh");
    }

    #[tokio::test]
    async fn test_never_resolving_network_fails_with_no_response() {
        let (fetcher, _caches, scope) = setup();
        fetcher.on("https://example.com/hang", StubOutcome::Pending);
        let strategy = StaleWhileRevalidate::new(scope, StrategyConfig::new())
            .with_network_timeout(Duration::from_millis(50));

        let error = strategy
            .handle(Request::get("https://example.com/hang").unwrap().into())
            .await
            .unwrap_err();
        assert!(matches!(error, SwError::NoResponse { .. }));
    }

    #[tokio::test]
    async fn test_network_failure_keeps_source() {
        let (fetcher, _caches, scope) = setup();
        fetcher.on(
            "https://example.com/down",
            StubOutcome::Fail("connection refused".to_string()),
        );
        let strategy = StaleWhileRevalidate::new(scope, StrategyConfig::new());

        let error = strategy
            .handle(Request::get("https://example.com/down").unwrap().into())
            .await
            .unwrap_err();
        match error {
            SwError::NoResponse { source, .. } => {
                assert!(source.unwrap().to_string().contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_adds_ok_and_opaque_policy_only_when_missing() {
        let (_fetcher, _caches, scope) = setup();
        let strategy = StaleWhileRevalidate::new(scope.clone(), StrategyConfig::new());
        assert_eq!(strategy.core().plugins().len(), 1);

        let custom = StaleWhileRevalidate::new(
            scope,
            StrategyConfig::new().with_plugin(Arc::new(CacheOkAndOpaquePlugin)),
        );
        assert_eq!(custom.core().plugins().len(), 1);
    }
}
