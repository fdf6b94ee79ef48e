//! Routing requests to the precache

use crate::{controller::PrecacheController, entry::PrecacheEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use swcache_core::{
    SwError, SwResult, UrlVariationOptions, generate_url_variations, key::UrlManipulation,
};
use swcache_routing::{Capture, MatchContext, MatchResult, Route, Router};
use swcache_strategies::RouteHandler;

/// How a request URL is mapped onto manifest URLs
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrecacheRouteOptions {
    /// Query parameter name patterns removed before lookup
    pub ignore_url_parameters_matching: Vec<String>,
    /// File tried for directory-like paths
    pub directory_index: Option<String>,
    /// Try `<path>.html` for extensionless paths
    pub clean_urls: bool,
    /// Extra candidate URLs, tried last
    #[serde(skip)]
    pub url_manipulation: Option<UrlManipulation>,
}

impl Default for PrecacheRouteOptions {
    fn default() -> Self {
        Self {
            ignore_url_parameters_matching: vec!["^utm_".to_string(), "^fbclid$".to_string()],
            directory_index: Some("index.html".to_string()),
            clean_urls: true,
            url_manipulation: None,
        }
    }
}

impl std::fmt::Debug for PrecacheRouteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecacheRouteOptions")
            .field(
                "ignore_url_parameters_matching",
                &self.ignore_url_parameters_matching,
            )
            .field("directory_index", &self.directory_index)
            .field("clean_urls", &self.clean_urls)
            .field("url_manipulation", &self.url_manipulation.is_some())
            .finish()
    }
}

impl PrecacheRouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored_params(mut self, patterns: Vec<String>) -> Self {
        self.ignore_url_parameters_matching = patterns;
        self
    }

    pub fn with_directory_index(mut self, index: Option<String>) -> Self {
        self.directory_index = index;
        self
    }

    pub fn with_clean_urls(mut self, enabled: bool) -> Self {
        self.clean_urls = enabled;
        self
    }

    pub fn with_url_manipulation(mut self, manipulation: UrlManipulation) -> Self {
        self.url_manipulation = Some(manipulation);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        for pattern in &self.ignore_url_parameters_matching {
            Regex::new(pattern).map_err(|e| format!("invalid parameter pattern {pattern}: {e}"))?;
        }
        if self.directory_index.as_deref() == Some("") {
            return Err("directory index must not be empty".to_string());
        }
        Ok(())
    }

    fn variation_options(&self) -> SwResult<UrlVariationOptions> {
        self.validate().map_err(SwError::InvalidConfiguration)?;
        let patterns = self
            .ignore_url_parameters_matching
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SwError::InvalidConfiguration(e.to_string()))?;

        let mut options = UrlVariationOptions::new()
            .with_ignored_params(patterns)
            .with_directory_index(self.directory_index.clone())
            .with_clean_urls(self.clean_urls);
        if let Some(manipulation) = &self.url_manipulation {
            options = options.with_url_manipulation(Arc::clone(manipulation));
        }
        Ok(options)
    }
}

/// Route answering requests for manifest URLs from the precache
///
/// The matcher walks the candidate URLs of a request, most specific first,
/// and matches on the first one registered in the manifest. The route params
/// carry that entry's `cacheKey` and, when known, its `integrity`.
#[derive(Debug, Clone)]
pub struct PrecacheRoute {
    route: Arc<Route>,
}

impl PrecacheRoute {
    pub fn new(controller: &PrecacheController, options: &PrecacheRouteOptions) -> SwResult<Self> {
        let variations = options.variation_options()?;
        let manifest = Arc::clone(controller.manifest());

        let matcher = move |ctx: &MatchContext<'_>| {
            let manifest = manifest.read();
            for candidate in generate_url_variations(ctx.url, &variations) {
                let Some(cache_key) = manifest.cache_key_for(candidate.as_str()) else {
                    continue;
                };
                let mut params = BTreeMap::from([("cacheKey".to_string(), cache_key.to_string())]);
                if let Some(integrity) = manifest.integrity_for(cache_key) {
                    params.insert("integrity".to_string(), integrity.to_string());
                }
                return MatchResult::Params(params);
            }
            MatchResult::Bool(false)
        };

        let handler: Arc<dyn RouteHandler> = Arc::clone(controller.strategy()) as Arc<dyn RouteHandler>;
        Ok(Self {
            route: Arc::new(Route::new(matcher, handler)),
        })
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }
}

impl From<PrecacheRoute> for Capture {
    fn from(route: PrecacheRoute) -> Self {
        Self::Route(route.route)
    }
}

/// Register `entries` with the controller and route their URLs to the
/// precache
pub fn precache_and_route(
    controller: &PrecacheController,
    router: &Router,
    entries: &[PrecacheEntry],
    options: &PrecacheRouteOptions,
) -> SwResult<Arc<Route>> {
    controller.precache(entries)?;
    let route = PrecacheRoute::new(controller, options)?;
    router.register_route(Arc::clone(route.route()));
    Ok(route.route)
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::controller::PrecacheOptions;
    use pretty_assertions::assert_eq;
    use swcache_core::{
        CacheStorage, Fetcher, HandlerEvent, MemoryCacheStorage, Request, RouteParams,
        StubFetcher, WorkerScope,
    };
    use url::Url;

    fn controller() -> PrecacheController {
        let scope = WorkerScope::new(
            Url::parse("https://app.test/").unwrap(),
            Arc::new(MemoryCacheStorage::new()) as Arc<dyn CacheStorage>,
            Arc::new(StubFetcher::new()) as Arc<dyn Fetcher>,
        );
        let controller = PrecacheController::new(scope, PrecacheOptions::new());
        controller
            .add_to_cache_list(&[
                PrecacheEntry::revisioned("/index.html", "1"),
                PrecacheEntry::revisioned("/about.html", "2"),
                PrecacheEntry::from("/font.woff2").with_integrity("sha256-abc"),
            ])
            .unwrap();
        controller
    }

    fn params_for(route: &PrecacheRoute, url: &str) -> Option<RouteParams> {
        let url = Url::parse(url).unwrap();
        let request = Request::new(url.clone());
        route
            .route()
            .matches(&MatchContext {
                url: &url,
                same_origin: true,
                request: &request,
                event: &HandlerEvent::None,
            })
            .into_params()
    }

    #[test]
    fn test_matches_url_variations() {
        let controller = controller();
        let route = PrecacheRoute::new(&controller, &PrecacheRouteOptions::new()).unwrap();

        for url in [
            "https://app.test/index.html",
            "https://app.test/index.html?utm_source=mail",
            "https://app.test/",
            "https://app.test/index.html#top",
        ] {
            assert_eq!(
                params_for(&route, url).and_then(|p| p.get("cacheKey").map(ToString::to_string)),
                Some("https://app.test/index.html?__WB_REVISION__=1".to_string()),
                "{url}"
            );
        }
        assert_eq!(
            params_for(&route, "https://app.test/about")
                .and_then(|p| p.get("cacheKey").map(ToString::to_string)),
            Some("https://app.test/about.html?__WB_REVISION__=2".to_string())
        );
        assert!(params_for(&route, "https://app.test/contact").is_none());
    }

    #[test]
    fn test_integrity_travels_in_params() {
        let controller = controller();
        let route = PrecacheRoute::new(&controller, &PrecacheRouteOptions::new()).unwrap();
        let params = params_for(&route, "https://app.test/font.woff2").unwrap();
        assert_eq!(params.get("integrity"), Some("sha256-abc"));
    }

    #[test]
    fn test_disabled_variations() {
        let controller = controller();
        let options = PrecacheRouteOptions::new()
            .with_directory_index(None)
            .with_clean_urls(false)
            .with_ignored_params(Vec::new());
        let route = PrecacheRoute::new(&controller, &options).unwrap();
        assert!(params_for(&route, "https://app.test/").is_none());
        assert!(params_for(&route, "https://app.test/about").is_none());
        assert!(params_for(&route, "https://app.test/index.html?utm_source=x").is_none());
    }

    #[test]
    fn test_url_manipulation_is_tried_last() {
        let controller = controller();
        let options = PrecacheRouteOptions::new().with_url_manipulation(Arc::new(|url: &Url| {
            vec![url.join("/about.html").unwrap()]
        }));
        let route = PrecacheRoute::new(&controller, &options).unwrap();
        assert_eq!(
            params_for(&route, "https://app.test/anything")
                .and_then(|p| p.get("cacheKey").map(ToString::to_string)),
            Some("https://app.test/about.html?__WB_REVISION__=2".to_string())
        );
    }

    #[test]
    fn test_invalid_options() {
        let options = PrecacheRouteOptions::new().with_ignored_params(vec!["(".to_string()]);
        assert!(options.validate().is_err());
        assert!(matches!(
            PrecacheRoute::new(&controller(), &options),
            Err(SwError::InvalidConfiguration(_))
        ));
    }
}
