//! Network-first and network-only strategies

use crate::{
    handler::StrategyHandler,
    plugin::{CacheOkAndOpaquePlugin, PluginHook},
    strategy::{Strategy, StrategyConfig, StrategyCore},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use swcache_core::{Request, Response, SwError, SwResult, WorkerScope};
use tokio::sync::oneshot;

/// Tries the network first, caching successful responses, and falls back to
/// the cache when the network fails or is slower than `network_timeout`
pub struct NetworkFirst {
    core: Arc<StrategyCore>,
    network_timeout: Option<Duration>,
}

impl NetworkFirst {
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

type NetworkOutcome = (SwResult<Option<Response>>, Option<SwError>);

async fn network_then_cache(handler: Arc<StrategyHandler>, request: Request) -> NetworkOutcome {
    match handler.fetch_and_cache_put(request.clone()).await {
        Ok(response) => (Ok(Some(response)), None),
        Err(error) => {
            tracing::debug!("Network failed for {}, trying cache", request.url());
            (handler.cache_match(request).await, Some(error))
        }
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn core(&self) -> &Arc<StrategyCore> {
        &self.core
    }

    async fn respond(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        let (tx, mut rx) = oneshot::channel::<NetworkOutcome>();
        let network_handler = Arc::clone(handler);
        let network_request = request.clone();
        handler.spawn_lifetime(async move {
            let _ = tx.send(network_then_cache(network_handler, network_request).await);
            Ok(())
        });

        if let Some(timeout) = self.network_timeout
            && tokio::time::timeout(timeout, &mut rx).await.is_err()
        {
            tracing::debug!("Network timed out for {}, trying cache", request.url());
            if let Some(cached) = handler.cache_match(request.clone()).await? {
                return Ok(cached);
            }
        }

        let no_response = |source: Option<SwError>| SwError::NoResponse {
            url: request.url().to_string(),
            source: source.map(Box::new),
        };
        match rx.await {
            Ok((Ok(Some(response)), _)) => Ok(response),
            Ok((Ok(None), network_error)) => Err(no_response(network_error)),
            Ok((Err(error), _)) => Err(no_response(Some(error))),
            Err(_) => Err(no_response(None)),
        }
    }
}

/// Always uses the network
pub struct NetworkOnly {
    core: Arc<StrategyCore>,
    network_timeout: Option<Duration>,
}

impl NetworkOnly {
    pub fn new(scope: WorkerScope, config: StrategyConfig) -> Self {
        Self {
            core: Arc::new(StrategyCore::runtime(scope, config)),
            network_timeout: None,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Strategy for NetworkOnly {
    fn core(&self) -> &Arc<StrategyCore> {
        &self.core
    }

    async fn respond(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        let fetch = handler.fetch(request.clone());
        let result = match self.network_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetch)
                .await
                .unwrap_or_else(|_| Err(SwError::Network("timed out".to_string()))),
            None => fetch.await,
        };
        result.map_err(|error| SwError::NoResponse {
            url: request.url().to_string(),
            source: Some(Box::new(error)),
        })
    }
}
