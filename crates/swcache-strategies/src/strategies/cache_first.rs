//! Cache-first and cache-only strategies

use crate::{
    handler::StrategyHandler,
    strategy::{Strategy, StrategyConfig, StrategyCore},
};
use async_trait::async_trait;
use std::sync::Arc;
use swcache_core::{Request, Response, SwError, SwResult, WorkerScope};

/// Answers from the cache, falling back to the network (and caching the
/// result) on a miss
pub struct CacheFirst {
    core: Arc<StrategyCore>,
}

impl CacheFirst {
    pub fn new(scope: WorkerScope, config: StrategyConfig) -> Self {
        Self {
            core: Arc::new(StrategyCore::runtime(scope, config)),
        }
    }
}

#[async_trait]
impl Strategy for CacheFirst {
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

        tracing::debug!("No cached response for {}, using network", request.url());
        handler
            .fetch_and_cache_put(request.clone())
            .await
            .map_err(|error| SwError::NoResponse {
                url: request.url().to_string(),
                source: Some(Box::new(error)),
            })
    }
}

/// Answers from the cache only
pub struct CacheOnly {
    core: Arc<StrategyCore>,
}

impl CacheOnly {
    pub fn new(scope: WorkerScope, config: StrategyConfig) -> Self {
        Self {
            core: Arc::new(StrategyCore::runtime(scope, config)),
        }
    }
}

#[async_trait]
impl Strategy for CacheOnly {
    fn core(&self) -> &Arc<StrategyCore> {
        &self.core
    }

    async fn respond(
        &self,
        request: Request,
        handler: &Arc<StrategyHandler>,
    ) -> SwResult<Response> {
        handler
            .cache_match(request.clone())
            .await?
            .ok_or_else(|| SwError::no_response(request.url().as_str()))
    }
}
