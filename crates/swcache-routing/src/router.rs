//! Request router
//!
//! Routes are kept per HTTP method in registration order; the first route
//! whose matcher accepts a request handles it. Requests no route accepts go
//! to the method's default handler, if any. Handler failures are retried
//! against the route's catch handler and then the router's global one.

use crate::{
    message::{CacheUrlEntry, RouterMessage},
    route::{Capture, MatchContext, Route},
};
use futures::future::join_all;
use http::Method;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use swcache_core::{HandlerEvent, Request, Response, RouteParams, SwError, SwResult};
use swcache_strategies::{HandlerOptions, RouteHandler};
use tokio::sync::oneshot;
use url::Url;

/// Dispatches requests to route handlers
pub struct Router {
    origin: Url,
    routes: RwLock<HashMap<Method, Vec<Arc<Route>>>>,
    default_handlers: RwLock<HashMap<Method, Arc<dyn RouteHandler>>>,
    catch_handler: RwLock<Option<Arc<dyn RouteHandler>>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: usize = self.routes.read().values().map(Vec::len).sum();
        f.debug_struct("Router")
            .field("origin", &self.origin.as_str())
            .field("routes", &routes)
            .field("default_handlers", &self.default_handlers.read().len())
            .field("has_catch_handler", &self.catch_handler.read().is_some())
            .finish()
    }
}

impl Router {
    /// Create a router for requests made from `origin`
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            routes: RwLock::new(HashMap::new()),
            default_handlers: RwLock::new(HashMap::new()),
            catch_handler: RwLock::new(None),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Routes registered for `method`, in match order
    pub fn routes(&self, method: &Method) -> Vec<Arc<Route>> {
        self.routes.read().get(method).cloned().unwrap_or_default()
    }

    /// Handler for requests of `method` that match no route
    pub fn set_default_handler(&self, handler: Arc<dyn RouteHandler>, method: Method) {
        self.default_handlers.write().insert(method, handler);
    }

    /// Handler for requests whose handler failed
    pub fn set_catch_handler(&self, handler: Arc<dyn RouteHandler>) {
        *self.catch_handler.write() = Some(handler);
    }

    /// Append `route` to its method's list
    pub fn register_route(&self, route: Arc<Route>) {
        tracing::debug!("Registering {} route", route.method());
        self.routes
            .write()
            .entry(route.method().clone())
            .or_default()
            .push(route);
    }

    /// Build a route from `capture` and register it
    ///
    /// `handler` and `method` are ignored for [`Capture::Route`].
    pub fn register_capture(
        &self,
        capture: Capture,
        handler: Arc<dyn RouteHandler>,
        method: Method,
    ) -> SwResult<Arc<Route>> {
        let route = match capture {
            Capture::Url(url) => {
                let resolved = self
                    .origin
                    .join(&url)
                    .map_err(|_| SwError::UnsupportedRouteType {
                        capture: format!("url {url}"),
                    })?;
                Arc::new(Route::exact(resolved, handler).with_method(method))
            }
            Capture::Regex(regex) => Arc::new(Route::regex(regex, handler).with_method(method)),
            Capture::Predicate(matcher) => {
                Arc::new(Route::from_match_fn(matcher, handler).with_method(method))
            }
            Capture::Route(route) => route,
        };
        self.register_route(Arc::clone(&route));
        Ok(route)
    }

    /// Remove a previously registered route
    pub fn unregister_route(&self, route: &Arc<Route>) -> SwResult<()> {
        let mut routes = self.routes.write();
        let Some(list) = routes.get_mut(route.method()) else {
            return Err(SwError::RouteMethodNotRegistered {
                method: route.method().to_string(),
            });
        };
        let Some(position) = list.iter().position(|r| Arc::ptr_eq(r, route)) else {
            return Err(SwError::RouteNotRegistered);
        };
        list.remove(position);
        Ok(())
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// First route accepting `request`, with its params
    pub fn find_matching_route(
        &self,
        request: &Request,
        event: &HandlerEvent,
    ) -> Option<(Arc<Route>, Option<RouteParams>)> {
        let url = request.url();
        let ctx = MatchContext {
            url,
            same_origin: self.is_same_origin(url),
            request,
            event,
        };
        for route in self.routes(request.method()) {
            let result = route.matches(&ctx);
            if result.is_match() {
                return Some((route, result.into_params()));
            }
        }
        None
    }

    /// Route `request` to a handler
    ///
    /// `None` when the request is not http(s) or no handler applies.
    pub async fn handle_request(
        &self,
        request: Request,
        event: HandlerEvent,
    ) -> Option<SwResult<Response>> {
        if !matches!(request.url().scheme(), "http" | "https") {
            tracing::debug!("Not routing non-http request {}", request.url());
            return None;
        }

        let matched = self.find_matching_route(&request, &event);
        let (route, params) = match matched {
            Some((route, params)) => (Some(route), params),
            None => (None, None),
        };

        let handler = match &route {
            Some(route) => Arc::clone(route.handler()),
            None => {
                let default = self.default_handlers.read().get(request.method()).cloned();
                let Some(handler) = default else {
                    tracing::debug!("No route for {} {}", request.method(), request.url());
                    return None;
                };
                tracing::debug!("Using default handler for {}", request.url());
                handler
            }
        };

        let options = HandlerOptions {
            request: request.clone(),
            event: event.clone(),
            params: params.clone(),
        };
        let mut error = match handler.run(options).await {
            Ok(response) => return Some(Ok(response)),
            Err(error) => error,
        };

        if let Some(catch_handler) = route.as_ref().and_then(|r| r.catch_handler()) {
            tracing::debug!("Route handler failed for {}: {error}", request.url());
            let options = HandlerOptions {
                request: request.clone(),
                event: event.clone(),
                params,
            };
            match catch_handler.run(options).await {
                Ok(response) => return Some(Ok(response)),
                Err(catch_error) => error = catch_error,
            }
        }

        let global = self.catch_handler.read().clone();
        if let Some(global) = global {
            tracing::debug!("Using global catch handler for {}", request.url());
            return Some(global.run(HandlerOptions::new(request).with_event(event)).await);
        }
        Some(Err(error))
    }

    /// Handle a control message
    ///
    /// `CACHE_URLS` routes every listed request concurrently and, once all
    /// succeeded, sends `true` on `reply`. A failed request fails the whole
    /// message and no reply is sent.
    pub async fn handle_message(
        &self,
        message: RouterMessage,
        reply: Option<oneshot::Sender<bool>>,
    ) -> SwResult<()> {
        let RouterMessage::CacheUrls { payload } = message else {
            tracing::debug!("Ignoring SKIP_WAITING message");
            return Ok(());
        };

        tracing::info!("Caching {} URLs from message", payload.urls_to_cache.len());
        let mut requests = Vec::with_capacity(payload.urls_to_cache.len());
        for entry in &payload.urls_to_cache {
            requests.push(self.message_request(entry)?);
        }

        let results = join_all(
            requests
                .into_iter()
                .map(|request| self.handle_request(request, HandlerEvent::Message)),
        )
        .await;
        for result in results.into_iter().flatten() {
            result?;
        }

        if let Some(reply) = reply {
            let _ = reply.send(true);
        }
        Ok(())
    }

    fn message_request(&self, entry: &CacheUrlEntry) -> SwResult<Request> {
        let request = Request::new(self.origin.join(entry.url())?);
        match entry.init() {
            Some(init) => request.apply_init(init),
            None => Ok(request),
        }
    }
}
