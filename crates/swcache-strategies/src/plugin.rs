//! Strategy plugins
//!
//! A plugin observes or transforms one stage of request handling. Every hook
//! has a pass-through default, and a plugin lists the hooks it actually
//! implements in [`StrategyPlugin::hooks`]; the handler only invokes those,
//! in plugin registration order, awaiting each before the next.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use swcache_core::{HandlerEvent, MatchOptions, Request, Response, RouteParams, SwError, SwResult};

/// Named plugin hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginHook {
    CacheKeyWillBeUsed,
    CacheWillUpdate,
    CacheDidUpdate,
    CachedResponseWillBeUsed,
    RequestWillFetch,
    FetchDidSucceed,
    FetchDidFail,
    HandlerWillStart,
    HandlerWillRespond,
    HandlerDidRespond,
    HandlerDidComplete,
    HandlerDidError,
}

impl PluginHook {
    /// Hook name as used in log output
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheKeyWillBeUsed => "cacheKeyWillBeUsed",
            Self::CacheWillUpdate => "cacheWillUpdate",
            Self::CacheDidUpdate => "cacheDidUpdate",
            Self::CachedResponseWillBeUsed => "cachedResponseWillBeUsed",
            Self::RequestWillFetch => "requestWillFetch",
            Self::FetchDidSucceed => "fetchDidSucceed",
            Self::FetchDidFail => "fetchDidFail",
            Self::HandlerWillStart => "handlerWillStart",
            Self::HandlerWillRespond => "handlerWillRespond",
            Self::HandlerDidRespond => "handlerDidRespond",
            Self::HandlerDidComplete => "handlerDidComplete",
            Self::HandlerDidError => "handlerDidError",
        }
    }
}

/// Per-plugin, per-request state bag
///
/// Each plugin gets its own bag for the lifetime of one handling cycle, so a
/// value stored in `handler_will_start` can be read back in
/// `handler_did_complete`.
#[derive(Clone, Default)]
pub struct PluginState {
    values: Arc<Mutex<http::Extensions>>,
}

impl std::fmt::Debug for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginState")
            .field("len", &self.values.lock().len())
            .finish()
    }
}

impl PluginState {
    /// Store a value, returning the previous value of the same type
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.values.lock().insert(value)
    }

    /// Clone out the stored value of type `T`
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values.lock().get::<T>().cloned()
    }

    pub fn remove<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values.lock().remove::<T>()
    }
}

/// Which side of the cache a key is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKeyMode {
    Read,
    Write,
}

impl CacheKeyMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Values every hook receives
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Event that started the handling cycle
    pub event: &'a HandlerEvent,
    /// This plugin's state bag for the cycle
    pub state: &'a PluginState,
}

pub struct CacheKeyWillBeUsedParams<'a> {
    pub request: Request,
    pub mode: CacheKeyMode,
    pub params: Option<&'a RouteParams>,
    pub context: HookContext<'a>,
}

pub struct CacheWillUpdateParams<'a> {
    pub request: &'a Request,
    pub response: Response,
    pub context: HookContext<'a>,
}

pub struct CacheDidUpdateParams<'a> {
    pub cache_name: &'a str,
    pub old_response: Option<Response>,
    pub new_response: Response,
    pub request: &'a Request,
    pub context: HookContext<'a>,
}

pub struct CachedResponseWillBeUsedParams<'a> {
    pub cache_name: &'a str,
    pub match_options: &'a MatchOptions,
    pub cached_response: Option<Response>,
    pub request: &'a Request,
    pub context: HookContext<'a>,
}

pub struct RequestWillFetchParams<'a> {
    pub request: Request,
    pub context: HookContext<'a>,
}

pub struct FetchDidSucceedParams<'a> {
    pub request: &'a Request,
    pub response: Response,
    pub context: HookContext<'a>,
}

pub struct FetchDidFailParams<'a> {
    /// Request as it was before `request_will_fetch` ran
    pub original_request: &'a Request,
    /// Request that was actually sent
    pub request: &'a Request,
    pub error: &'a SwError,
    pub context: HookContext<'a>,
}

pub struct HandlerWillStartParams<'a> {
    pub request: &'a Request,
    pub context: HookContext<'a>,
}

pub struct HandlerWillRespondParams<'a> {
    pub request: &'a Request,
    pub response: Response,
    pub context: HookContext<'a>,
}

pub struct HandlerDidRespondParams<'a> {
    pub request: &'a Request,
    pub response: Option<&'a Response>,
    pub context: HookContext<'a>,
}

pub struct HandlerDidCompleteParams<'a> {
    pub request: &'a Request,
    pub response: Option<&'a Response>,
    /// Error raised while finishing background work, if any
    pub error: Option<&'a SwError>,
    pub context: HookContext<'a>,
}

pub struct HandlerDidErrorParams<'a> {
    pub request: &'a Request,
    pub error: &'a SwError,
    pub context: HookContext<'a>,
}

/// A set of lifecycle hooks attached to a strategy
#[async_trait]
pub trait StrategyPlugin: Send + Sync {
    /// Hooks this plugin implements
    fn hooks(&self) -> &'static [PluginHook];

    /// Rewrite the request used as a cache key
    async fn cache_key_will_be_used(
        &self,
        params: CacheKeyWillBeUsedParams<'_>,
    ) -> SwResult<Request> {
        Ok(params.request)
    }

    /// Decide whether a response may be cached; `None` vetoes the write
    async fn cache_will_update(&self, params: CacheWillUpdateParams<'_>) -> SwResult<Option<Response>> {
        Ok(Some(params.response))
    }

    /// Observe a completed cache write
    async fn cache_did_update(&self, _params: CacheDidUpdateParams<'_>) -> SwResult<()> {
        Ok(())
    }

    /// Veto or replace a cache hit; `None` turns it into a miss
    async fn cached_response_will_be_used(
        &self,
        params: CachedResponseWillBeUsedParams<'_>,
    ) -> SwResult<Option<Response>> {
        Ok(params.cached_response)
    }

    /// Rewrite a request before it goes to the network
    async fn request_will_fetch(&self, params: RequestWillFetchParams<'_>) -> SwResult<Request> {
        Ok(params.request)
    }

    /// Transform a successful network response
    async fn fetch_did_succeed(&self, params: FetchDidSucceedParams<'_>) -> SwResult<Response> {
        Ok(params.response)
    }

    /// Observe a failed network request
    async fn fetch_did_fail(&self, _params: FetchDidFailParams<'_>) -> SwResult<()> {
        Ok(())
    }

    async fn handler_will_start(&self, _params: HandlerWillStartParams<'_>) -> SwResult<()> {
        Ok(())
    }

    /// Transform the response about to be returned
    async fn handler_will_respond(
        &self,
        params: HandlerWillRespondParams<'_>,
    ) -> SwResult<Response> {
        Ok(params.response)
    }

    async fn handler_did_respond(&self, _params: HandlerDidRespondParams<'_>) -> SwResult<()> {
        Ok(())
    }

    async fn handler_did_complete(&self, _params: HandlerDidCompleteParams<'_>) -> SwResult<()> {
        Ok(())
    }

    /// Offer a fallback response after the strategy failed
    async fn handler_did_error(
        &self,
        _params: HandlerDidErrorParams<'_>,
    ) -> SwResult<Option<Response>> {
        Ok(None)
    }
}

/// Cacheability policy accepting only status 200 and opaque responses
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOkAndOpaquePlugin;

#[async_trait]
impl StrategyPlugin for CacheOkAndOpaquePlugin {
    fn hooks(&self) -> &'static [PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(&self, params: CacheWillUpdateParams<'_>) -> SwResult<Option<Response>> {
        let status = params.response.status();
        Ok((status == 200 || status == 0).then_some(params.response))
    }
}
