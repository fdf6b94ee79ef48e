//! Plugins the precache controller attaches to its strategy

use crate::controller::{InstallResult, Manifest};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use swcache_core::{Request, Response, SwResult};
use swcache_strategies::{
    CacheKeyWillBeUsedParams, CachedResponseWillBeUsedParams, HandlerWillStartParams, PluginHook,
    StrategyPlugin,
};
use url::Url;

#[derive(Clone)]
struct OriginalRequest(Request);

/// Records which URLs an install fetched and which were already cached
#[derive(Debug, Default)]
pub struct InstallReportPlugin {
    report: Mutex<InstallResult>,
}

impl InstallReportPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the report collected so far
    pub fn take(&self) -> InstallResult {
        std::mem::take(&mut *self.report.lock())
    }
}

#[async_trait]
impl StrategyPlugin for InstallReportPlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[
            PluginHook::HandlerWillStart,
            PluginHook::CachedResponseWillBeUsed,
        ]
    }

    async fn handler_will_start(&self, params: HandlerWillStartParams<'_>) -> SwResult<()> {
        params
            .context
            .state
            .insert(OriginalRequest(params.request.clone()));
        Ok(())
    }

    async fn cached_response_will_be_used(
        &self,
        params: CachedResponseWillBeUsedParams<'_>,
    ) -> SwResult<Option<Response>> {
        if params.context.event.is_install()
            && let Some(OriginalRequest(original)) = params.context.state.get::<OriginalRequest>()
        {
            let url = original.url().to_string();
            let mut report = self.report.lock();
            if params.cached_response.is_some() {
                report.not_updated_urls.push(url);
            } else {
                report.updated_urls.push(url);
            }
        }
        Ok(params.cached_response)
    }
}

/// Rewrites request URLs to their precache keys
///
/// The key comes from the `cacheKey` route param when present, otherwise
/// from the manifest.
pub struct CacheKeyPlugin {
    manifest: Arc<RwLock<Manifest>>,
}

impl CacheKeyPlugin {
    pub(crate) fn new(manifest: Arc<RwLock<Manifest>>) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl StrategyPlugin for CacheKeyPlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[PluginHook::CacheKeyWillBeUsed]
    }

    async fn cache_key_will_be_used(
        &self,
        params: CacheKeyWillBeUsedParams<'_>,
    ) -> SwResult<Request> {
        let from_params = params
            .params
            .and_then(|p| p.get("cacheKey"))
            .map(ToString::to_string);
        let cache_key = from_params.or_else(|| {
            self.manifest
                .read()
                .cache_key_for(params.request.url().as_str())
                .map(ToString::to_string)
        });

        match cache_key {
            Some(key) => Ok(params.request.with_url(Url::parse(&key)?)),
            None => Ok(params.request),
        }
    }
}
