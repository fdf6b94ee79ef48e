//! Routes and matchers

use http::Method;
use parking_lot::RwLock;
use regex::Regex;
use std::{collections::BTreeMap, sync::Arc};
use swcache_core::{HandlerEvent, Request, RouteParams};
use swcache_strategies::RouteHandler;
use url::Url;

/// What a matcher sees for each request
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub url: &'a Url,
    /// Whether `url` has the router's origin
    pub same_origin: bool,
    pub request: &'a Request,
    pub event: &'a HandlerEvent,
}

/// Value returned by a matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Bool(bool),
    Captures(Vec<String>),
    Params(BTreeMap<String, String>),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::Bool(false))
    }

    /// Route params carried by a match; `None` for a bare or empty match
    pub fn into_params(self) -> Option<RouteParams> {
        match self {
            Self::Bool(_) => None,
            Self::Captures(values) if values.is_empty() => None,
            Self::Params(map) if map.is_empty() => None,
            Self::Captures(values) => Some(RouteParams::Captures(values)),
            Self::Params(map) => Some(RouteParams::Map(map)),
        }
    }
}

impl From<bool> for MatchResult {
    fn from(matched: bool) -> Self {
        Self::Bool(matched)
    }
}

/// Matcher callback
pub type MatchFn = Arc<dyn Fn(&MatchContext<'_>) -> MatchResult + Send + Sync>;

/// A matcher paired with the handler for the requests it accepts
pub struct Route {
    matcher: MatchFn,
    handler: Arc<dyn RouteHandler>,
    method: Method,
    catch_handler: RwLock<Option<Arc<dyn RouteHandler>>>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("has_catch_handler", &self.catch_handler.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Route {
    /// A GET route matching with `matcher`
    pub fn new<F>(matcher: F, handler: Arc<dyn RouteHandler>) -> Self
    where
        F: Fn(&MatchContext<'_>) -> MatchResult + Send + Sync + 'static,
    {
        Self::from_match_fn(Arc::new(matcher), handler)
    }

    pub fn from_match_fn(matcher: MatchFn, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            matcher,
            handler,
            method: Method::GET,
            catch_handler: RwLock::new(None),
        }
    }

    /// A route matching the full URL against `regex`
    ///
    /// Capture groups become route params. Cross-origin URLs only match when
    /// the match starts at the beginning of the URL, so a pattern like
    /// `/styles/.*\.css` never matches third-party hosts.
    pub fn regex(regex: Regex, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(
            move |ctx: &MatchContext<'_>| {
                let Some(captures) = regex.captures(ctx.url.as_str()) else {
                    return MatchResult::Bool(false);
                };
                if !ctx.same_origin && captures.get(0).is_some_and(|m| m.start() != 0) {
                    tracing::debug!(
                        "Regex {} matched cross-origin {} past its start",
                        regex.as_str(),
                        ctx.url
                    );
                    return MatchResult::Bool(false);
                }
                MatchResult::Captures(
                    captures
                        .iter()
                        .skip(1)
                        .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                        .collect(),
                )
            },
            handler,
        )
    }

    /// A route matching exactly one URL, fragment included
    pub fn exact(url: Url, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(
            move |ctx: &MatchContext<'_>| MatchResult::Bool(ctx.url == &url),
            handler,
        )
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }

    /// Handler tried when this route's handler fails
    pub fn set_catch_handler(&self, handler: Arc<dyn RouteHandler>) {
        *self.catch_handler.write() = Some(handler);
    }

    pub fn catch_handler(&self) -> Option<Arc<dyn RouteHandler>> {
        self.catch_handler.read().clone()
    }

    pub fn matches(&self, ctx: &MatchContext<'_>) -> MatchResult {
        (self.matcher)(ctx)
    }
}

/// Shapes accepted by [`Router::register_capture`](crate::Router::register_capture)
pub enum Capture {
    /// URL resolved against the router origin, matched exactly
    Url(String),
    /// Regex over the full URL
    Regex(Regex),
    /// Arbitrary matcher
    Predicate(MatchFn),
    /// An already-built route, registered as is
    Route(Arc<Route>),
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
            Self::Route(route) => f.debug_tuple("Route").field(route).finish(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use swcache_core::{Response, SwResult};
    use swcache_strategies::{HandlerOptions, handler_fn};

    fn handler() -> Arc<dyn RouteHandler> {
        Arc::new(handler_fn(|_options: HandlerOptions| async {
            SwResult::Ok(Response::ok("ok"))
        }))
    }

    fn check(route: &Route, url: &str, same_origin: bool) -> MatchResult {
        let url = Url::parse(url).unwrap();
        let request = Request::new(url.clone());
        route.matches(&MatchContext {
            url: &url,
            same_origin,
            request: &request,
            event: &HandlerEvent::None,
        })
    }

    #[test]
    fn test_match_result_normalization() {
        assert!(!MatchResult::Bool(false).is_match());
        assert!(MatchResult::Bool(true).is_match());
        assert_eq!(MatchResult::Bool(true).into_params(), None);
        assert_eq!(MatchResult::Captures(vec![]).into_params(), None);
        assert_eq!(MatchResult::Params(BTreeMap::new()).into_params(), None);
        assert_eq!(
            MatchResult::Captures(vec!["a".into()]).into_params(),
            Some(RouteParams::Captures(vec!["a".into()]))
        );
    }

    #[test]
    fn test_regex_route_captures() {
        let route = Route::regex(Regex::new(r"/api/(\w+)/(\d+)?").unwrap(), handler());
        assert_eq!(
            check(&route, "https://app.test/api/users/", true),
            MatchResult::Captures(vec!["users".into(), String::new()])
        );
        assert!(!check(&route, "https://app.test/static/x", true).is_match());
    }

    #[test]
    fn test_regex_route_cross_origin_must_match_from_start() {
        let route = Route::regex(Regex::new(r"/styles/.*\.css").unwrap(), handler());
        assert!(check(&route, "https://app.test/styles/a.css", true).is_match());
        assert!(!check(&route, "https://cdn.test/styles/a.css", false).is_match());

        let anchored = Route::regex(Regex::new(r"^https://cdn\.test/.*").unwrap(), handler());
        assert!(check(&anchored, "https://cdn.test/styles/a.css", false).is_match());
    }

    #[test]
    fn test_exact_route() {
        let route = Route::exact(Url::parse("https://app.test/index.html").unwrap(), handler())
            .with_method(Method::POST);
        assert_eq!(route.method(), &Method::POST);
        assert!(check(&route, "https://app.test/index.html", true).is_match());
        assert!(!check(&route, "https://app.test/index.html?x=1", true).is_match());
    }
}
