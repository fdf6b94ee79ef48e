//! Strategy plugin that applies expiration to runtime caches

use crate::{
    config::ExpirationConfig, manager::now_ms, registry::ExpirationRegistry,
    store::TimestampStore,
};
use async_trait::async_trait;
use chrono::DateTime;
use futures::FutureExt;
use std::sync::Arc;
use swcache_core::{Response, SwError, SwResult, WorkerScope};
use swcache_strategies::{
    CacheDidUpdateParams, CachedResponseWillBeUsedParams, PluginHook, StrategyPlugin,
};

/// Limits the age and number of entries in the caches of the strategies it
/// is attached to
///
/// Every cache read and write bumps the URL's timestamp and triggers an
/// eviction pass. Cached responses whose `Date` header is older than the
/// maximum age are treated as misses.
#[derive(Debug)]
pub struct ExpirationPlugin {
    config: ExpirationConfig,
    registry: ExpirationRegistry,
}

impl ExpirationPlugin {
    /// Create a plugin for `scope`, keeping timestamps in `store`
    pub fn new(
        scope: &WorkerScope,
        store: Arc<dyn TimestampStore>,
        config: ExpirationConfig,
    ) -> SwResult<Self> {
        config.validate().map_err(SwError::InvalidConfiguration)?;

        let registry = ExpirationRegistry::new(
            Arc::clone(scope.caches()),
            store,
            config.clone(),
            scope.cache_names().runtime_name(None),
        );

        if config.purge_on_quota_error {
            let purge = registry.clone();
            scope.quota().register(Arc::new(move || {
                let registry = purge.clone();
                async move {
                    if let Err(e) = registry.delete_cache_and_metadata().await {
                        tracing::warn!("Failed to purge expired caches after quota error: {e}");
                    }
                }
                .boxed()
            }));
        }

        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &ExpirationRegistry {
        &self.registry
    }

    /// Delete every cache this plugin manages along with its timestamps
    pub async fn delete_cache_and_metadata(&self) -> SwResult<()> {
        self.registry.delete_cache_and_metadata().await
    }

    fn is_response_date_fresh(&self, response: &Response) -> bool {
        let Some(max_age) = self.config.max_age_ms() else {
            return true;
        };
        match date_header_ms(response) {
            Some(date) => date >= now_ms() - max_age,
            None => true,
        }
    }
}

/// `Date` header as ms since the epoch, if present and parseable
fn date_header_ms(response: &Response) -> Option<i64> {
    let value = response.header("date")?;
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|date| date.timestamp_millis())
}

#[async_trait]
impl StrategyPlugin for ExpirationPlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[PluginHook::CachedResponseWillBeUsed, PluginHook::CacheDidUpdate]
    }

    async fn cached_response_will_be_used(
        &self,
        params: CachedResponseWillBeUsedParams<'_>,
    ) -> SwResult<Option<Response>> {
        let Some(cached) = params.cached_response else {
            return Ok(None);
        };

        let fresh = self.is_response_date_fresh(&cached);
        let manager = self.registry.get_or_create(params.cache_name)?;

        let pass = manager.expire_entries();
        let cache_name = params.cache_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = pass.await {
                tracing::warn!("Expiration of {cache_name} failed: {e}");
            }
        });

        manager.update_timestamp(params.request.url()).await?;
        if !fresh {
            tracing::debug!("Cached response for {} is stale", params.request.url());
        }
        Ok(fresh.then_some(cached))
    }

    async fn cache_did_update(&self, params: CacheDidUpdateParams<'_>) -> SwResult<()> {
        let manager = self.registry.get_or_create(params.cache_name)?;
        manager.update_timestamp(params.request.url()).await?;
        manager.expire_entries().await
    }
}
