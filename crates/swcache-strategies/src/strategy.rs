//! Strategy trait and shared configuration

use crate::{
    handler::StrategyHandler,
    plugin::{PluginHook, StrategyPlugin},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{future::Future, sync::Arc};
use swcache_core::{
    HandlerEvent, MatchOptions, Request, RequestInit, Response, RouteParams, SwError, SwResult,
    WorkerScope,
};
use tokio::task::JoinHandle;

/// User-facing strategy configuration
#[derive(Clone, Default)]
pub struct StrategyConfig {
    /// Cache to read and write; the scope's default name when unset
    pub cache_name: Option<String>,
    /// Plugins in invocation order
    pub plugins: Vec<Arc<dyn StrategyPlugin>>,
    /// Overlay applied to non-navigation network requests
    pub fetch_options: Option<RequestInit>,
    /// Options for cache lookups
    pub match_options: MatchOptions,
}

impl std::fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("cache_name", &self.cache_name)
            .field("plugins", &self.plugins.len())
            .field("fetch_options", &self.fetch_options)
            .field("match_options", &self.match_options)
            .finish()
    }
}

impl StrategyConfig {
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

    pub fn with_fetch_options(mut self, options: RequestInit) -> Self {
        self.fetch_options = Some(options);
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }
}

/// Resolved configuration and collaborators shared by a strategy and the
/// handlers it creates
pub struct StrategyCore {
    scope: WorkerScope,
    cache_name: String,
    plugins: RwLock<Vec<Arc<dyn StrategyPlugin>>>,
    fetch_options: Option<RequestInit>,
    match_options: MatchOptions,
}

impl StrategyCore {
    /// Build a core writing to `cache_name`
    pub fn new(scope: WorkerScope, cache_name: String, config: StrategyConfig) -> Self {
        Self {
            scope,
            cache_name,
            plugins: RwLock::new(config.plugins),
            fetch_options: config.fetch_options,
            match_options: config.match_options,
        }
    }

    /// Build a core whose cache defaults to the scope's runtime cache
    pub fn runtime(scope: WorkerScope, config: StrategyConfig) -> Self {
        let cache_name = scope
            .cache_names()
            .runtime_name(config.cache_name.as_deref());
        Self::new(scope, cache_name, config)
    }

    pub fn scope(&self) -> &WorkerScope {
        &self.scope
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn fetch_options(&self) -> Option<&RequestInit> {
        self.fetch_options.as_ref()
    }

    pub fn match_options(&self) -> &MatchOptions {
        &self.match_options
    }

    /// Snapshot of the current plugin list
    pub fn plugins(&self) -> Vec<Arc<dyn StrategyPlugin>> {
        self.plugins.read().clone()
    }

    /// Plugins implementing `hook`, in registration order
    pub fn plugins_for(&self, hook: PluginHook) -> Vec<Arc<dyn StrategyPlugin>> {
        self.plugins
            .read()
            .iter()
            .filter(|p| p.hooks().contains(&hook))
            .cloned()
            .collect()
    }

    pub fn has_plugin_for(&self, hook: PluginHook) -> bool {
        self.plugins.read().iter().any(|p| p.hooks().contains(&hook))
    }

    /// Append a plugin
    pub fn add_plugin(&self, plugin: Arc<dyn StrategyPlugin>) {
        self.plugins.write().push(plugin);
    }

    /// Insert a plugin ahead of all others
    pub fn prepend_plugin(&self, plugin: Arc<dyn StrategyPlugin>) {
        self.plugins.write().insert(0, plugin);
    }

    /// Remove a plugin by identity; returns whether it was present
    pub fn remove_plugin(&self, plugin: &Arc<dyn StrategyPlugin>) -> bool {
        let mut plugins = self.plugins.write();
        let before = plugins.len();
        plugins.retain(|p| !Arc::ptr_eq(p, plugin));
        plugins.len() != before
    }
}

/// Input to one handling cycle
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub request: Request,
    pub event: HandlerEvent,
    /// Parameters produced by the matching route
    pub params: Option<RouteParams>,
}

impl HandlerOptions {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            event: HandlerEvent::None,
            params: None,
        }
    }

    pub fn with_event(mut self, event: HandlerEvent) -> Self {
        self.event = event;
        self
    }

    pub fn with_params(mut self, params: Option<RouteParams>) -> Self {
        self.params = params;
        self
    }
}

impl From<Request> for HandlerOptions {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

/// Resolves once a handling cycle's background work and completion hooks
/// have finished
#[derive(Debug)]
pub struct HandlerCompletion {
    handle: JoinHandle<SwResult<()>>,
}

impl HandlerCompletion {
    /// Wait for the cycle to finish
    pub async fn wait(self) -> SwResult<()> {
        self.handle.await?
    }
}

/// A policy for resolving a request to a response
#[async_trait]
pub trait Strategy: Send + Sync + 'static {
    /// Shared configuration
    fn core(&self) -> &Arc<StrategyCore>;

    /// Strategy-specific logic for one request
    async fn respond(&self, request: Request, handler: &Arc<StrategyHandler>)
    -> SwResult<Response>;

    /// Handle a request and return its response
    ///
    /// Background work keeps running after the response is returned.
    async fn handle(&self, options: HandlerOptions) -> SwResult<Response> {
        let (response, _completion) = self.handle_all(options).await;
        response
    }

    /// Handle a request, returning the response and a completion that
    /// resolves after background work and completion hooks have finished
    async fn handle_all(&self, options: HandlerOptions) -> (SwResult<Response>, HandlerCompletion) {
        let HandlerOptions {
            request,
            event,
            params,
        } = options;
        let handler = Arc::new(StrategyHandler::new(
            Arc::clone(self.core()),
            request.clone(),
            event,
            params,
        ));

        let response = get_response(self, &handler, request).await;

        let tail = Arc::clone(&handler);
        let settled = response.as_ref().ok().cloned();
        let handle = tokio::spawn(async move { tail.finish(settled).await });
        (response, HandlerCompletion { handle })
    }
}

async fn get_response<S: Strategy + ?Sized>(
    strategy: &S,
    handler: &Arc<StrategyHandler>,
    request: Request,
) -> SwResult<Response> {
    handler.run_handler_will_start().await?;

    let result = match strategy.respond(request.clone(), handler).await {
        Ok(response) if response.is_error() => Err(SwError::no_response(request.url().as_str())),
        other => other,
    };

    let response = match result {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!("Strategy failed for {}: {error}", request.url());
            match handler.run_handler_did_error(&error).await? {
                Some(fallback) => fallback,
                None => return Err(error),
            }
        }
    };

    handler.run_handler_will_respond(response).await
}

/// Something a route can dispatch a request to
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn run(&self, options: HandlerOptions) -> SwResult<Response>;
}

#[async_trait]
impl<S: Strategy> RouteHandler for S {
    async fn run(&self, options: HandlerOptions) -> SwResult<Response> {
        self.handle(options).await
    }
}

/// Route handler backed by an async closure
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`RouteHandler`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(HandlerOptions) -> Fut + Send + Sync,
    Fut: Future<Output = SwResult<Response>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> RouteHandler for HandlerFn<F>
where
    F: Fn(HandlerOptions) -> Fut + Send + Sync,
    Fut: Future<Output = SwResult<Response>> + Send,
{
    async fn run(&self, options: HandlerOptions) -> SwResult<Response> {
        (self.f)(options).await
    }
}
