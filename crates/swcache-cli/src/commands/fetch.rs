use crate::output::{OutputFormat, print_json};
use anyhow::Context;
use async_trait::async_trait;
use http::Method;
use serde::Serialize;
use std::{io::Write, sync::Arc};
use swcache_core::{HandlerEvent, Request, Response, SwResult, WorkerScope};
use swcache_expiration::{ExpirationConfig, ExpirationPlugin, TimestampStore};
use swcache_routing::Router;
use swcache_strategies::{
    HandlerOptions, RouteHandler, StaleWhileRevalidate, Strategy, StrategyConfig,
};

/// Runs a strategy and waits for its background cache writes
///
/// A one-shot process exits once the response is printed, so revalidation
/// must finish before the handler returns.
struct SettledHandler<S> {
    strategy: S,
}

#[async_trait]
impl<S: Strategy> RouteHandler for SettledHandler<S> {
    async fn run(&self, options: HandlerOptions) -> SwResult<Response> {
        let (response, completion) = self.strategy.handle_all(options).await;
        let response = response?;
        completion.wait().await?;
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub url: String,
    pub status: u16,
    pub cache_name: String,
    pub bytes: usize,
}

/// Router sending every GET through a stale-while-revalidate cache
pub fn build_router(
    scope: &WorkerScope,
    store: Arc<dyn TimestampStore>,
    cache: Option<String>,
    max_entries: Option<usize>,
) -> anyhow::Result<(Router, String)> {
    let mut config = StrategyConfig::new();
    if let Some(cache) = cache {
        config = config.with_cache_name(cache);
    }
    if let Some(max_entries) = max_entries {
        let default_name = scope.cache_names().runtime_name(None);
        if scope.cache_names().runtime_name(config.cache_name.as_deref()) == default_name {
            anyhow::bail!("--max-entries needs a custom --cache, not {default_name}");
        }
        let plugin = ExpirationPlugin::new(
            scope,
            store,
            ExpirationConfig::new().with_max_entries(max_entries),
        )?;
        config = config.with_plugin(Arc::new(plugin));
    }

    let strategy = StaleWhileRevalidate::new(scope.clone(), config);
    let cache_name = strategy.core().cache_name().to_string();
    let router = Router::new(scope.origin().clone());
    router.set_default_handler(Arc::new(SettledHandler { strategy }), Method::GET);
    Ok((router, cache_name))
}

/// Fetch `url` through the router
pub async fn fetch(
    scope: &WorkerScope,
    store: Arc<dyn TimestampStore>,
    url: &str,
    cache: Option<String>,
    max_entries: Option<usize>,
) -> anyhow::Result<(FetchReport, Response)> {
    let (router, cache_name) = build_router(scope, store, cache, max_entries)?;
    let url = scope.resolve(url)?;
    let response = router
        .handle_request(Request::new(url.clone()), HandlerEvent::fetch())
        .await
        .with_context(|| format!("no handler for {url}"))?
        .with_context(|| format!("fetching {url}"))?;

    let report = FetchReport {
        url: url.to_string(),
        status: response.status(),
        cache_name,
        bytes: response.body().len(),
    };
    Ok((report, response))
}

pub async fn handle(
    scope: &WorkerScope,
    store: Arc<dyn TimestampStore>,
    url: &str,
    cache: Option<String>,
    max_entries: Option<usize>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let (report, response) = fetch(scope, store, url, cache, max_entries).await?;
    tracing::info!(
        "{} {} ({} bytes) via {}",
        report.status,
        report.url,
        report.bytes,
        report.cache_name
    );
    if print_json(format, &report)? {
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(response.body())?;
    stdout.flush()?;
    Ok(())
}
