//! Per-request handling context
//!
//! A [`StrategyHandler`] is created for every handling cycle. It carries the
//! request, the triggering event and route params, and implements the
//! plugin-aware cache and network operations strategies are built from.
#![allow(clippy::significant_drop_tightening)]

use crate::{
    plugin::{
        CacheDidUpdateParams, CacheKeyMode, CacheKeyWillBeUsedParams, CacheWillUpdateParams,
        CachedResponseWillBeUsedParams, FetchDidFailParams, FetchDidSucceedParams,
        HandlerDidCompleteParams, HandlerDidErrorParams, HandlerDidRespondParams,
        HandlerWillRespondParams, HandlerWillStartParams, HookContext, PluginHook, PluginState,
        RequestWillFetchParams, StrategyPlugin,
    },
    strategy::StrategyCore,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::Arc,
};
use swcache_core::{
    HandlerEvent, REVISION_SEARCH_PARAM, Request, RequestMode, Response, RouteParams, SwError,
    SwResult, WorkerScope, cache_match_ignore_params,
};
use tokio::task::JoinHandle;

/// Handling context for one request
pub struct StrategyHandler {
    core: Arc<StrategyCore>,
    request: Request,
    event: HandlerEvent,
    params: Option<RouteParams>,
    plugin_states: Mutex<Vec<(Arc<dyn StrategyPlugin>, PluginState)>>,
    cache_keys: Mutex<HashMap<String, Request>>,
    lifetime_tasks: Mutex<VecDeque<JoinHandle<SwResult<()>>>>,
}

impl std::fmt::Debug for StrategyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHandler")
            .field("request", &self.request.url().as_str())
            .field("cache_name", &self.core.cache_name())
            .field("pending_tasks", &self.lifetime_tasks.lock().len())
            .finish_non_exhaustive()
    }
}

impl StrategyHandler {
    pub fn new(
        core: Arc<StrategyCore>,
        request: Request,
        event: HandlerEvent,
        params: Option<RouteParams>,
    ) -> Self {
        Self {
            core,
            request,
            event,
            params,
            plugin_states: Mutex::new(Vec::new()),
            cache_keys: Mutex::new(HashMap::new()),
            lifetime_tasks: Mutex::new(VecDeque::new()),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn event(&self) -> &HandlerEvent {
        &self.event
    }

    pub fn params(&self) -> Option<&RouteParams> {
        self.params.as_ref()
    }

    pub fn cache_name(&self) -> &str {
        self.core.cache_name()
    }

    pub fn scope(&self) -> &WorkerScope {
        self.core.scope()
    }

    /// Whether any plugin implements `hook`
    pub fn has_callback(&self, hook: PluginHook) -> bool {
        self.core.has_plugin_for(hook)
    }

    fn state_for(&self, plugin: &Arc<dyn StrategyPlugin>) -> PluginState {
        let mut states = self.plugin_states.lock();
        if let Some((_, state)) = states.iter().find(|(p, _)| Arc::ptr_eq(p, plugin)) {
            return state.clone();
        }
        let state = PluginState::default();
        states.push((Arc::clone(plugin), state.clone()));
        state
    }

    /// Plugins implementing `hook` paired with their state for this cycle
    fn callbacks(&self, hook: PluginHook) -> Vec<(Arc<dyn StrategyPlugin>, PluginState)> {
        self.core
            .plugins_for(hook)
            .into_iter()
            .map(|plugin| {
                let state = self.state_for(&plugin);
                (plugin, state)
            })
            .collect()
    }

    const fn context<'a>(&'a self, state: &'a PluginState) -> HookContext<'a> {
        HookContext {
            event: &self.event,
            state,
        }
    }

    /// Fetch `input` from the network through the plugin pipeline
    ///
    /// A navigation preload response carried by the event is used instead of
    /// the network when present.
    pub async fn fetch(&self, input: Request) -> SwResult<Response> {
        let mut request = input;

        if request.mode() == RequestMode::Navigate
            && let Some(preload) = self.event.preload_response()
        {
            tracing::debug!("Using navigation preload response for {}", request.url());
            return Ok(preload.clone());
        }

        let original_request = self
            .has_callback(PluginHook::FetchDidFail)
            .then(|| request.clone());

        for (plugin, state) in self.callbacks(PluginHook::RequestWillFetch) {
            request = plugin
                .request_will_fetch(RequestWillFetchParams {
                    request,
                    context: self.context(&state),
                })
                .await
                .map_err(|e| SwError::PluginRequestWillFetch {
                    message: e.to_string(),
                })?;
        }

        let options = if request.mode() == RequestMode::Navigate {
            None
        } else {
            self.core.fetch_options()
        };

        match self
            .scope()
            .fetcher()
            .fetch(request.clone(), options)
            .await
        {
            Ok(mut response) => {
                tracing::debug!(
                    "Network request for {} returned status {}",
                    request.url(),
                    response.status()
                );
                for (plugin, state) in self.callbacks(PluginHook::FetchDidSucceed) {
                    response = plugin
                        .fetch_did_succeed(FetchDidSucceedParams {
                            request: &request,
                            response,
                            context: self.context(&state),
                        })
                        .await?;
                }
                Ok(response)
            }
            Err(error) => {
                tracing::debug!("Network request for {} failed: {error}", request.url());
                if let Some(original_request) = &original_request {
                    for (plugin, state) in self.callbacks(PluginHook::FetchDidFail) {
                        plugin
                            .fetch_did_fail(FetchDidFailParams {
                                original_request,
                                request: &request,
                                error: &error,
                                context: self.context(&state),
                            })
                            .await?;
                    }
                }
                Err(error)
            }
        }
    }

    /// Fetch from the network and write the response to the cache in the
    /// background
    pub async fn fetch_and_cache_put(self: &Arc<Self>, input: Request) -> SwResult<Response> {
        let response = self.fetch(input.clone()).await?;

        let writer = Arc::clone(self);
        let to_cache = response.clone();
        self.spawn_lifetime(async move {
            writer.cache_put(input, Some(to_cache)).await.map(|_| ())
        });
        Ok(response)
    }

    /// Look up `key` in this strategy's cache through the plugin pipeline
    pub async fn cache_match(&self, key: Request) -> SwResult<Option<Response>> {
        let effective = self.get_cache_key(&key, CacheKeyMode::Read).await?;
        let cache_name = self.core.cache_name();
        let match_options = self.core.match_options();

        let mut cached = self
            .scope()
            .caches()
            .match_in(cache_name, &effective, match_options)
            .await?;
        tracing::debug!(
            "Cache {} {} for {}",
            cache_name,
            if cached.is_some() { "hit" } else { "miss" },
            effective.url()
        );

        for (plugin, state) in self.callbacks(PluginHook::CachedResponseWillBeUsed) {
            cached = plugin
                .cached_response_will_be_used(CachedResponseWillBeUsedParams {
                    cache_name,
                    match_options,
                    cached_response: cached,
                    request: &effective,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(cached)
    }

    /// Write `response` to this strategy's cache under `key`
    ///
    /// Returns `false` when the cacheability policy rejected the response.
    /// A quota failure runs the scope's quota callbacks before the error is
    /// returned.
    pub async fn cache_put(&self, key: Request, response: Option<Response>) -> SwResult<bool> {
        // Let the response reach the caller before the write starts
        tokio::task::yield_now().await;

        let effective = self.get_cache_key(&key, CacheKeyMode::Write).await?;
        let Some(response) = response else {
            return Err(SwError::CachePutWithNoResponse {
                url: effective.url().to_string(),
            });
        };

        let Some(to_cache) = self.ensure_response_safe_to_cache(response).await? else {
            tracing::debug!("Response for {} will not be cached", effective.url());
            return Ok(false);
        };

        let cache_name = self.core.cache_name();
        let cache = self.scope().caches().open(cache_name).await?;
        let has_did_update = self.has_callback(PluginHook::CacheDidUpdate);
        let old_response = if has_did_update {
            cache_match_ignore_params(
                cache.as_ref(),
                &effective,
                &[REVISION_SEARCH_PARAM],
                self.core.match_options(),
            )
            .await?
        } else {
            None
        };

        tracing::debug!("Updating cache {} for {}", cache_name, effective.url());
        if let Err(error) = cache.put(&effective, to_cache.clone()).await {
            if error.is_quota_exceeded() {
                self.scope().quota().execute().await;
            }
            return Err(error);
        }

        for (plugin, state) in self.callbacks(PluginHook::CacheDidUpdate) {
            plugin
                .cache_did_update(CacheDidUpdateParams {
                    cache_name,
                    old_response: old_response.clone(),
                    new_response: to_cache.clone(),
                    request: &effective,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(true)
    }

    /// Cache key for `request`, computed once per URL and mode
    pub async fn get_cache_key(&self, request: &Request, mode: CacheKeyMode) -> SwResult<Request> {
        let memo_key = format!("{} | {}", request.url(), mode.as_str());
        if let Some(key) = self.cache_keys.lock().get(&memo_key) {
            return Ok(key.clone());
        }

        let mut effective = request.clone();
        for (plugin, state) in self.callbacks(PluginHook::CacheKeyWillBeUsed) {
            effective = plugin
                .cache_key_will_be_used(CacheKeyWillBeUsedParams {
                    request: effective,
                    mode,
                    params: self.params.as_ref(),
                    context: self.context(&state),
                })
                .await?;
        }

        self.cache_keys.lock().insert(memo_key, effective.clone());
        Ok(effective)
    }

    async fn ensure_response_safe_to_cache(&self, response: Response) -> SwResult<Option<Response>> {
        let callbacks = self.callbacks(PluginHook::CacheWillUpdate);
        if callbacks.is_empty() {
            return Ok((response.status() == 200).then_some(response));
        }

        let mut candidate = Some(response);
        for (plugin, state) in callbacks {
            let Some(response) = candidate.take() else {
                break;
            };
            candidate = plugin
                .cache_will_update(CacheWillUpdateParams {
                    request: &self.request,
                    response,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(candidate)
    }

    /// Keep the handling cycle alive until `task` finishes
    pub fn wait_until(&self, task: JoinHandle<SwResult<()>>) {
        self.lifetime_tasks.lock().push_back(task);
    }

    /// Spawn `work` and track it as lifetime work of this cycle
    pub fn spawn_lifetime<F>(&self, work: F)
    where
        F: Future<Output = SwResult<()>> + Send + 'static,
    {
        self.wait_until(tokio::spawn(work));
    }

    /// Await every lifetime task, including ones added while waiting
    ///
    /// All tasks are drained; the first failure is returned.
    pub async fn done_waiting(&self) -> SwResult<()> {
        let mut first_error = None;
        loop {
            let next = self.lifetime_tasks.lock().pop_front();
            let Some(task) = next else {
                break;
            };
            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(join_error.into()),
            };
            if let Err(error) = result {
                tracing::warn!("Background task for {} failed: {error}", self.request.url());
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) async fn run_handler_will_start(&self) -> SwResult<()> {
        for (plugin, state) in self.callbacks(PluginHook::HandlerWillStart) {
            plugin
                .handler_will_start(HandlerWillStartParams {
                    request: &self.request,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn run_handler_did_error(&self, error: &SwError) -> SwResult<Option<Response>> {
        for (plugin, state) in self.callbacks(PluginHook::HandlerDidError) {
            let fallback = plugin
                .handler_did_error(HandlerDidErrorParams {
                    request: &self.request,
                    error,
                    context: self.context(&state),
                })
                .await?;
            if fallback.is_some() {
                return Ok(fallback);
            }
        }
        Ok(None)
    }

    pub(crate) async fn run_handler_will_respond(&self, mut response: Response) -> SwResult<Response> {
        for (plugin, state) in self.callbacks(PluginHook::HandlerWillRespond) {
            response = plugin
                .handler_will_respond(HandlerWillRespondParams {
                    request: &self.request,
                    response,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(response)
    }

    async fn run_handler_did_respond(&self, response: Option<&Response>) -> SwResult<()> {
        for (plugin, state) in self.callbacks(PluginHook::HandlerDidRespond) {
            plugin
                .handler_did_respond(HandlerDidRespondParams {
                    request: &self.request,
                    response,
                    context: self.context(&state),
                })
                .await?;
        }
        Ok(())
    }

    /// Completion tail of a handling cycle
    pub(crate) async fn finish(&self, response: Option<Response>) -> SwResult<()> {
        let mut error = self.run_handler_did_respond(response.as_ref()).await.err();
        if error.is_none() {
            error = self.done_waiting().await.err();
        }

        for (plugin, state) in self.callbacks(PluginHook::HandlerDidComplete) {
            plugin
                .handler_did_complete(HandlerDidCompleteParams {
                    request: &self.request,
                    response: response.as_ref(),
                    error: error.as_ref(),
                    context: self.context(&state),
                })
                .await?;
        }
        error.map_or(Ok(()), Err)
    }
}
