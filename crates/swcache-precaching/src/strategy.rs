//! Strategy serving precached responses

use async_trait::async_trait;
use std::sync::Arc;
use swcache_core::{Request, RequestMode, Response, SwError, SwResult, WorkerScope};
use swcache_strategies::{
    CacheWillUpdateParams, PluginHook, Strategy, StrategyConfig, StrategyCore, StrategyHandler,
    StrategyPlugin,
};
use url::Url;

/// Rejects error responses during precaching
///
/// Installed when no other plugin decides cacheability.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecacheCacheabilityPlugin;

#[async_trait]
impl StrategyPlugin for PrecacheCacheabilityPlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> SwResult<Option<Response>> {
        Ok((params.response.status() < 400).then_some(params.response))
    }
}

/// Stores redirected responses as plain copies, so they can later answer
/// navigations
#[derive(Debug, Clone)]
pub struct CopyRedirectedPlugin {
    origin: Url,
}

impl CopyRedirectedPlugin {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl StrategyPlugin for CopyRedirectedPlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> SwResult<Option<Response>> {
        let response = params.response;
        if !response.redirected() {
            return Ok(Some(response));
        }

        let origin = response
            .url()
            .map_or_else(|| "null".to_string(), |url| url.origin().ascii_serialization());
        if origin != self.origin.origin().ascii_serialization() {
            return Err(SwError::CrossOriginCopyResponse { origin });
        }
        Ok(Some(response.copy()))
    }
}

/// Cache-first strategy over the precache
///
/// A cache miss during install fetches and stores the response, failing when
/// it cannot be stored. Outside install a miss goes to the network when
/// `fallback_to_network` is set, and the response is written through only
/// when the route supplied an integrity value the request agrees with.
pub struct PrecacheStrategy {
    core: Arc<StrategyCore>,
    fallback_to_network: bool,
    cacheability: Arc<dyn StrategyPlugin>,
    copy_redirected: Arc<dyn StrategyPlugin>,
}

impl std::fmt::Debug for PrecacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecacheStrategy")
            .field("cache_name", &self.core.cache_name())
            .field("fallback_to_network", &self.fallback_to_network)
            .finish_non_exhaustive()
    }
}

impl PrecacheStrategy {
    /// Build a precache strategy; the cache name defaults to the scope's
    /// precache name
    pub fn new(scope: WorkerScope, config: StrategyConfig) -> Self {
        let cache_name = scope
            .cache_names()
            .precache_name(config.cache_name.as_deref());
        let copy_redirected: Arc<dyn StrategyPlugin> =
            Arc::new(CopyRedirectedPlugin::new(scope.origin().clone()));
        let core = Arc::new(StrategyCore::new(scope, cache_name, config));
        core.add_plugin(Arc::clone(&copy_redirected));
        Self {
            core,
            fallback_to_network: true,
            cacheability: Arc::new(PrecacheCacheabilityPlugin),
            copy_redirected,
        }
    }

    pub fn with_fallback_to_network(mut self, enabled: bool) -> Self {
        self.fallback_to_network = enabled;
        self
    }

    pub fn cache_name(&self) -> &str {
        self.core.cache_name()
    }

    /// Keep exactly one cacheability decision in force
    ///
    /// Adds the default policy when nothing else implements
    /// `cacheWillUpdate`, and drops it again once another plugin does.
    fn use_default_cacheability_plugin_if_needed(&self) {
        let plugins = self.core.plugins();
        let mut deciding = 0;
        let mut has_default = false;
        for plugin in &plugins {
            if Arc::ptr_eq(plugin, &self.copy_redirected) {
                continue;
            }
            if Arc::ptr_eq(plugin, &self.cacheability) {
                has_default = true;
            }
            if plugin.hooks().contains(&PluginHook::CacheWillUpdate) {
                deciding += 1;
            }
        }

        if deciding == 0 {
            self.core.add_plugin(Arc::clone(&self.cacheability));
        } else if deciding > 1 && has_default {
            self.core.remove_plugin(&self.cacheability);
        }
    }

    async fn handle_install(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        self.use_default_cacheability_plugin_if_needed();

        let response = handler.fetch(request.clone()).await?;
        if !handler.cache_put(request.clone(), Some(response.clone())).await? {
            return Err(SwError::BadPrecachingResponse {
                url: request.url().to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }

    async fn handle_fetch(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        if !self.fallback_to_network {
            return Err(SwError::MissingPrecacheEntry {
                cache_name: self.cache_name().to_string(),
                url: request.url().to_string(),
            });
        }

        let manifest_integrity = handler
            .params()
            .and_then(|params| params.get("integrity"))
            .map(ToString::to_string);
        let request_integrity = request.integrity().map(ToString::to_string);
        let no_cors = request.mode() == RequestMode::NoCors;
        let integrity_agrees =
            request_integrity.is_none() || request_integrity == manifest_integrity;

        let integrity = if no_cors {
            None
        } else {
            request_integrity.or_else(|| manifest_integrity.clone())
        };
        let response = handler
            .fetch(request.clone().with_integrity(integrity))
            .await?;

        if manifest_integrity.is_some() && integrity_agrees && !no_cors {
            self.use_default_cacheability_plugin_if_needed();
            let url = request.url().to_string();
            let written = handler.cache_put(request, Some(response.clone())).await?;
            tracing::debug!("Precache write-through for {url}: {written}");
        }
        Ok(response)
    }
}

#[async_trait]
impl Strategy for PrecacheStrategy {
    fn core(&self) -> &Arc<StrategyCore> {
        &self.core
    }

    async fn respond(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        if let Some(cached) = handler.cache_match(request.clone()).await? {
            return Ok(cached);
        }

        if handler.event().is_install() {
            self.handle_install(request, handler).await
        } else {
            tracing::debug!("Precache miss for {}", request.url());
            self.handle_fetch(request, handler).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use swcache_core::{
        CacheStorage, Fetcher, HandlerEvent, MatchOptions, MemoryCacheStorage, StubFetcher,
        StubOutcome,
    };
    use swcache_strategies::{CacheOkAndOpaquePlugin, HandlerOptions};

    fn setup() -> (Arc<StubFetcher>, Arc<MemoryCacheStorage>, WorkerScope) {
        let fetcher = Arc::new(StubFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let scope = WorkerScope::new(
            Url::parse("https://app.test/").unwrap(),
            Arc::clone(&caches) as Arc<dyn CacheStorage>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        );
        (fetcher, caches, scope)
    }

    fn install(url: &str) -> HandlerOptions {
        HandlerOptions::new(Request::get(url).unwrap()).with_event(HandlerEvent::Install)
    }

    #[tokio::test]
    async fn test_install_rejects_error_responses() {
        let (fetcher, caches, scope) = setup();
        fetcher.on(
            "https://app.test/missing.js",
            StubOutcome::Respond(Response::new(404, "nope")),
        );
        let strategy = PrecacheStrategy::new(scope, StrategyConfig::new());

        let result = strategy.handle(install("https://app.test/missing.js")).await;
        assert!(matches!(
            result,
            Err(SwError::BadPrecachingResponse { status: 404, .. })
        ));
        let cache = caches.open(strategy.cache_name()).await.unwrap();
        assert!(
            cache
                .keys(None, &MatchOptions::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_default_cacheability_plugin_is_added_once() {
        let (fetcher, _caches, scope) = setup();
        fetcher.respond_ok("https://app.test/a.js", "a");
        fetcher.respond_ok("https://app.test/b.js", "b");
        let strategy = PrecacheStrategy::new(scope, StrategyConfig::new());
        assert_eq!(strategy.core().plugins().len(), 1);

        let (_, done) = strategy.handle_all(install("https://app.test/a.js")).await;
        done.wait().await.unwrap();
        let (_, done) = strategy.handle_all(install("https://app.test/b.js")).await;
        done.wait().await.unwrap();
        assert_eq!(strategy.core().plugins().len(), 2);

        // A user policy takes over from the default one
        strategy
            .core()
            .add_plugin(Arc::new(CacheOkAndOpaquePlugin));
        strategy.use_default_cacheability_plugin_if_needed();
        assert!(
            !strategy
                .core()
                .plugins()
                .iter()
                .any(|p| Arc::ptr_eq(p, &strategy.cacheability))
        );
    }

    #[tokio::test]
    async fn test_missing_entry_without_network_fallback() {
        let (_fetcher, _caches, scope) = setup();
        let strategy =
            PrecacheStrategy::new(scope, StrategyConfig::new()).with_fallback_to_network(false);
        let result = strategy
            .handle(Request::get("https://app.test/a.js").unwrap().into())
            .await;
        assert!(matches!(result, Err(SwError::MissingPrecacheEntry { .. })));
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_cannot_be_copied() {
        let (fetcher, _caches, scope) = setup();
        fetcher.on(
            "https://app.test/login",
            StubOutcome::Respond(
                Response::ok("page")
                    .with_redirected(true)
                    .with_url(Url::parse("https://auth.test/login").unwrap()),
            ),
        );
        let strategy = PrecacheStrategy::new(scope, StrategyConfig::new());
        let result = strategy.handle(install("https://app.test/login")).await;
        assert!(matches!(
            result,
            Err(SwError::CrossOriginCopyResponse { origin }) if origin == "https://auth.test"
        ));
    }

    #[tokio::test]
    async fn test_same_origin_redirect_is_stored_as_copy() {
        let (fetcher, caches, scope) = setup();
        fetcher.on(
            "https://app.test/",
            StubOutcome::Respond(
                Response::ok("home")
                    .with_redirected(true)
                    .with_url(Url::parse("https://app.test/home").unwrap()),
            ),
        );
        let strategy = PrecacheStrategy::new(scope, StrategyConfig::new());
        let (response, done) = strategy.handle_all(install("https://app.test/")).await;
        assert!(response.unwrap().redirected());
        done.wait().await.unwrap();

        let stored = caches
            .match_in(
                strategy.cache_name(),
                &Request::get("https://app.test/").unwrap(),
                &MatchOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.redirected());
        assert_eq!(stored.body(), "home");
    }
}
