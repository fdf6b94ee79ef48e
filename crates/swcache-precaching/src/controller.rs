//! Precache manifest controller
//!
//! The controller owns the URL to cache key mapping built from one or more
//! manifests and drives the two lifecycle steps: install fetches every
//! manifest entry into the precache, activate deletes stored keys the
//! current manifest no longer names.

use crate::{
    entry::{PrecacheEntry, create_cache_key},
    plugins::{CacheKeyPlugin, InstallReportPlugin},
    strategy::PrecacheStrategy,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};
use swcache_core::{
    CacheMode, Credentials, HandlerEvent, MatchOptions, Request, Response, RouteParams, SwError,
    SwResult, WorkerScope,
};
use swcache_strategies::{HandlerOptions, RouteHandler, Strategy, StrategyConfig, StrategyPlugin};
use url::Url;

/// URLs fetched by an install, and URLs that were already cached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub updated_urls: Vec<String>,
    pub not_updated_urls: Vec<String>,
}

/// Cache keys removed by an activate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateResult {
    pub deleted_urls: Vec<String>,
}

/// Registered precache entries, in registration order
#[derive(Debug, Default)]
pub(crate) struct Manifest {
    urls: Vec<String>,
    cache_keys: HashMap<String, String>,
    cache_modes: HashMap<String, CacheMode>,
    integrities: HashMap<String, String>,
}

struct InstallRequest {
    url: String,
    cache_key: String,
    cache_mode: CacheMode,
    integrity: Option<String>,
}

impl Manifest {
    fn register(
        &mut self,
        url: String,
        cache_key: String,
        cache_mode: CacheMode,
        integrity: Option<&str>,
    ) -> SwResult<()> {
        if let Some(existing) = self.cache_keys.get(&url)
            && existing != &cache_key
        {
            return Err(SwError::ConflictingEntries {
                first_entry: existing.clone(),
                second_entry: cache_key,
            });
        }

        if let Some(integrity) = integrity {
            if let Some(existing) = self.integrities.get(&cache_key)
                && existing != integrity
            {
                return Err(SwError::ConflictingIntegrities { url });
            }
            self.integrities
                .insert(cache_key.clone(), integrity.to_string());
        }

        if !self.cache_keys.contains_key(&url) {
            self.urls.push(url.clone());
        }
        self.cache_modes.insert(url.clone(), cache_mode);
        self.cache_keys.insert(url, cache_key);
        Ok(())
    }

    pub(crate) fn cache_key_for(&self, url: &str) -> Option<&str> {
        self.cache_keys.get(url).map(String::as_str)
    }

    pub(crate) fn integrity_for(&self, cache_key: &str) -> Option<&str> {
        self.integrities.get(cache_key).map(String::as_str)
    }

    fn urls_to_cache_keys(&self) -> Vec<(String, String)> {
        self.urls
            .iter()
            .filter_map(|url| Some((url.clone(), self.cache_keys.get(url)?.clone())))
            .collect()
    }

    fn install_requests(&self) -> Vec<InstallRequest> {
        self.urls_to_cache_keys()
            .into_iter()
            .map(|(url, cache_key)| InstallRequest {
                cache_mode: self.cache_modes.get(&url).copied().unwrap_or_default(),
                integrity: self.integrities.get(&cache_key).cloned(),
                url,
                cache_key,
            })
            .collect()
    }
}

/// Options for a [`PrecacheController`]
#[derive(Clone)]
pub struct PrecacheOptions {
    /// Precache name; the scope's precache name when unset
    pub cache_name: Option<String>,
    /// Plugins run ahead of the controller's own
    pub plugins: Vec<Arc<dyn StrategyPlugin>>,
    /// Fetch precache misses from the network outside install
    pub fallback_to_network: bool,
}

impl Default for PrecacheOptions {
    fn default() -> Self {
        Self {
            cache_name: None,
            plugins: Vec::new(),
            fallback_to_network: true,
        }
    }
}

impl std::fmt::Debug for PrecacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecacheOptions")
            .field("cache_name", &self.cache_name)
            .field("plugins", &self.plugins.len())
            .field("fallback_to_network", &self.fallback_to_network)
            .finish()
    }
}

impl PrecacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn StrategyPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_fallback_to_network(mut self, enabled: bool) -> Self {
        self.fallback_to_network = enabled;
        self
    }
}

/// Owns the precache manifest and its lifecycle
pub struct PrecacheController {
    scope: WorkerScope,
    manifest: Arc<RwLock<Manifest>>,
    strategy: Arc<PrecacheStrategy>,
}

impl std::fmt::Debug for PrecacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecacheController")
            .field("cache_name", &self.strategy.cache_name())
            .field("entries", &self.manifest.read().urls.len())
            .finish()
    }
}

impl PrecacheController {
    pub fn new(scope: WorkerScope, options: PrecacheOptions) -> Self {
        let manifest = Arc::new(RwLock::new(Manifest::default()));
        let mut config = StrategyConfig::new();
        config.cache_name = options.cache_name;
        config.plugins = options.plugins;
        let config = config.with_plugin(Arc::new(CacheKeyPlugin::new(Arc::clone(&manifest))));
        let strategy = PrecacheStrategy::new(scope.clone(), config)
            .with_fallback_to_network(options.fallback_to_network);

        Self {
            scope,
            manifest,
            strategy: Arc::new(strategy),
        }
    }

    pub fn strategy(&self) -> &Arc<PrecacheStrategy> {
        &self.strategy
    }

    pub fn cache_name(&self) -> &str {
        self.strategy.cache_name()
    }

    pub(crate) fn manifest(&self) -> &Arc<RwLock<Manifest>> {
        &self.manifest
    }

    /// Register manifest entries
    ///
    /// Entries are registered in order; the first conflict stops the call
    /// with the earlier entries kept.
    pub fn add_to_cache_list(&self, entries: &[PrecacheEntry]) -> SwResult<()> {
        let mut unrevisioned = Vec::new();
        {
            let mut manifest = self.manifest.write();
            for entry in entries {
                if entry.lacks_revision_info() {
                    unrevisioned.push(entry.url().to_string());
                }
                let keyed = create_cache_key(entry, self.scope.origin())?;
                let cache_mode = if entry.revision().is_some() {
                    CacheMode::Reload
                } else {
                    CacheMode::Default
                };
                manifest.register(
                    keyed.url.to_string(),
                    keyed.cache_key.to_string(),
                    cache_mode,
                    entry.integrity(),
                )?;
            }
        }

        if !unrevisioned.is_empty() {
            tracing::warn!(
                "Precaching URLs without revision info, they may be served stale: {}",
                unrevisioned.join(", ")
            );
        }
        Ok(())
    }

    /// Register entries for hosts that run install and activate themselves
    pub fn precache(&self, entries: &[PrecacheEntry]) -> SwResult<()> {
        self.add_to_cache_list(entries)
    }

    /// Fetch every manifest entry not yet in the precache
    ///
    /// Entries are handled one at a time, each cycle's cache write awaited
    /// before the next starts.
    pub async fn install(&self) -> SwResult<InstallResult> {
        let report = Arc::new(InstallReportPlugin::new());
        let plugin: Arc<dyn StrategyPlugin> = Arc::clone(&report) as Arc<dyn StrategyPlugin>;
        self.strategy.core().add_plugin(Arc::clone(&plugin));

        let outcome = self.install_entries().await;
        self.strategy.core().remove_plugin(&plugin);
        outcome?;

        let result = report.take();
        tracing::info!(
            "Precache install: {} updated, {} already cached",
            result.updated_urls.len(),
            result.not_updated_urls.len()
        );
        Ok(result)
    }

    async fn install_entries(&self) -> SwResult<()> {
        let requests = self.manifest.read().install_requests();
        for entry in requests {
            let request = Request::new(Url::parse(&entry.url)?)
                .with_integrity(entry.integrity)
                .with_cache_mode(entry.cache_mode)
                .with_credentials(Credentials::SameOrigin);
            let params = RouteParams::Map(BTreeMap::from([(
                "cacheKey".to_string(),
                entry.cache_key,
            )]));
            let options = HandlerOptions::new(request)
                .with_event(HandlerEvent::Install)
                .with_params(Some(params));

            let (response, completion) = self.strategy.handle_all(options).await;
            response?;
            completion.wait().await?;
        }
        Ok(())
    }

    /// Delete precached keys the manifest no longer names
    pub async fn activate(&self) -> SwResult<ActivateResult> {
        let cache = self.scope.caches().open(self.cache_name()).await?;
        let stored = cache.keys(None, &MatchOptions::default()).await?;
        let expected: HashSet<String> = self.manifest.read().cache_keys.values().cloned().collect();

        let mut deleted_urls = Vec::new();
        for request in stored {
            if !expected.contains(request.url().as_str()) {
                cache.delete(&request, &MatchOptions::default()).await?;
                deleted_urls.push(request.url().to_string());
            }
        }

        tracing::info!("Precache activate: deleted {} stale entries", deleted_urls.len());
        Ok(ActivateResult { deleted_urls })
    }

    /// URL to cache key pairs, in registration order
    pub fn get_urls_to_cache_keys(&self) -> Vec<(String, String)> {
        self.manifest.read().urls_to_cache_keys()
    }

    pub fn get_cached_urls(&self) -> Vec<String> {
        self.manifest.read().urls.clone()
    }

    /// Cache key for a manifest URL, resolved against the scope origin
    pub fn get_cache_key_for_url(&self, url: &str) -> Option<String> {
        let resolved = self.scope.resolve(url).ok()?;
        self.manifest
            .read()
            .cache_key_for(resolved.as_str())
            .map(ToString::to_string)
    }

    pub fn get_integrity_for_cache_key(&self, cache_key: &str) -> Option<String> {
        self.manifest
            .read()
            .integrity_for(cache_key)
            .map(ToString::to_string)
    }

    /// Look up a manifest URL in the precache, bypassing strategies
    pub async fn match_precache(&self, url: &str) -> SwResult<Option<Response>> {
        let Some(cache_key) = self.get_cache_key_for_url(url) else {
            return Ok(None);
        };
        self.scope
            .caches()
            .match_in(
                self.cache_name(),
                &Request::new(Url::parse(&cache_key)?),
                &MatchOptions::default(),
            )
            .await
    }

    /// Handler that always answers with the precached response for `url`
    pub fn create_handler_bound_to_url(&self, url: &str) -> SwResult<Arc<dyn RouteHandler>> {
        let Some(cache_key) = self.get_cache_key_for_url(url) else {
            return Err(SwError::NonPrecachedUrl {
                url: url.to_string(),
            });
        };
        Ok(Arc::new(BoundPrecacheHandler {
            strategy: Arc::clone(&self.strategy),
            url: self.scope.resolve(url)?,
            cache_key,
        }))
    }
}

struct BoundPrecacheHandler {
    strategy: Arc<PrecacheStrategy>,
    url: Url,
    cache_key: String,
}

#[async_trait]
impl RouteHandler for BoundPrecacheHandler {
    async fn run(&self, options: HandlerOptions) -> SwResult<Response> {
        let mut params = BTreeMap::from([("cacheKey".to_string(), self.cache_key.clone())]);
        if let Some(route_params) = options.params {
            params.extend(route_params.into_map());
        }
        let options = HandlerOptions::new(Request::new(self.url.clone()))
            .with_event(options.event)
            .with_params(Some(RouteParams::Map(params)));
        self.strategy.handle(options).await
    }
}
