//! Response store collaborator
//!
//! The caching pipeline never stores bytes itself. It talks to a named-cache
//! store through the [`CacheStorage`] and [`Cache`] traits, which follow the
//! semantics of the Cache Storage standard: caches are keyed by request URL
//! (fragment ignored), only GET requests match unless `ignore_method` is set,
//! and `put` replaces any existing entry for the same URL.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryCacheStorage`]: in-process, with an optional byte quota
//! - [`DiskCacheStorage`]: one directory per cache, atomic file writes

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use crate::{
    error::{SwError, SwResult},
    http::{Request, Response},
    key::{remove_search_params, strip_fragment},
};
use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Options controlling how a request is compared with stored entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchOptions {
    /// Ignore the query string when comparing URLs
    pub ignore_search: bool,
    /// Match non-GET requests too
    pub ignore_method: bool,
    /// Ignore `Vary` headers; backends in this crate never apply `Vary`
    pub ignore_vary: bool,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_search(mut self, ignore: bool) -> Self {
        self.ignore_search = ignore;
        self
    }
}

/// A single named cache
#[async_trait]
pub trait Cache: Send + Sync {
    /// First stored response matching `request`
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> SwResult<Option<Response>>;

    /// Store `response` under `request`, replacing any entry for the same URL
    async fn put(&self, request: &Request, response: Response) -> SwResult<()>;

    /// Remove every entry matching `request`; returns whether anything was removed
    async fn delete(&self, request: &Request, options: &MatchOptions) -> SwResult<bool>;

    /// Stored requests in insertion order, optionally filtered by `request`
    async fn keys(&self, request: Option<&Request>, options: &MatchOptions)
    -> SwResult<Vec<Request>>;
}

/// The set of named caches
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it when missing
    async fn open(&self, cache_name: &str) -> SwResult<Arc<dyn Cache>>;

    async fn has(&self, cache_name: &str) -> SwResult<bool>;

    /// Delete a cache and all its entries; returns whether it existed
    async fn delete(&self, cache_name: &str) -> SwResult<bool>;

    /// Cache names in creation order
    async fn keys(&self) -> SwResult<Vec<String>>;

    /// Match `request` in one cache without creating it
    async fn match_in(
        &self,
        cache_name: &str,
        request: &Request,
        options: &MatchOptions,
    ) -> SwResult<Option<Response>> {
        if !self.has(cache_name).await? {
            return Ok(None);
        }
        self.open(cache_name)
            .await?
            .match_request(request, options)
            .await
    }
}

/// Whether a stored entry keyed by `stored_url` answers `request`
pub fn request_matches(
    request: &Request,
    stored_method: &Method,
    stored_url: &Url,
    options: &MatchOptions,
) -> bool {
    if !options.ignore_method && (request.method() != Method::GET || stored_method != Method::GET)
    {
        return false;
    }

    let mut query = strip_fragment(request.url());
    let mut stored = strip_fragment(stored_url);
    if options.ignore_search {
        query.set_query(None);
        stored.set_query(None);
    }
    query == stored
}

/// Reject requests and responses a cache must not store
pub fn validate_put(request: &Request, response: &Response) -> SwResult<()> {
    if request.method() != Method::GET {
        return Err(SwError::InvalidRequest(format!(
            "cannot cache {} request for {}",
            request.method(),
            request.url()
        )));
    }
    if response.status() == 206 {
        return Err(SwError::InvalidRequest(format!(
            "cannot cache partial response for {}",
            request.url()
        )));
    }
    Ok(())
}

/// Look up `request`, treating URLs as equal once the named query parameters
/// are removed from both sides
pub async fn cache_match_ignore_params(
    cache: &dyn Cache,
    request: &Request,
    ignore_params: &[&str],
    options: &MatchOptions,
) -> SwResult<Option<Response>> {
    let stripped = remove_search_params(request.url(), ignore_params);
    if &stripped == request.url() {
        return cache.match_request(request, options).await;
    }

    let search_free = MatchOptions {
        ignore_search: true,
        ..*options
    };
    for key in cache.keys(Some(request), &search_free).await? {
        if remove_search_params(key.url(), ignore_params) == stripped {
            return cache.match_request(&key, options).await;
        }
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::key::REVISION_SEARCH_PARAM;

    #[test]
    fn test_request_matches_ignores_fragment() {
        let request = Request::get("https://example.com/a#x").unwrap();
        let stored = Url::parse("https://example.com/a").unwrap();
        assert!(request_matches(&request, &Method::GET, &stored, &MatchOptions::default()));
    }

    #[test]
    fn test_request_matches_search_and_method() {
        let stored = Url::parse("https://example.com/a?v=1").unwrap();
        let request = Request::get("https://example.com/a?v=2").unwrap();
        assert!(!request_matches(&request, &Method::GET, &stored, &MatchOptions::default()));
        assert!(request_matches(
            &request,
            &Method::GET,
            &stored,
            &MatchOptions::new().with_ignore_search(true)
        ));

        let post = Request::get("https://example.com/a?v=1")
            .unwrap()
            .with_method(Method::POST);
        assert!(!request_matches(&post, &Method::GET, &stored, &MatchOptions::default()));
    }

    #[test]
    fn test_validate_put_rejects_post_and_partial() {
        let post = Request::get("https://example.com/")
            .unwrap()
            .with_method(Method::POST);
        assert!(validate_put(&post, &Response::ok("x")).is_err());

        let get = Request::get("https://example.com/").unwrap();
        assert!(validate_put(&get, &Response::new(206, "x")).is_err());
        assert!(validate_put(&get, &Response::new(404, "x")).is_ok());
    }

    #[tokio::test]
    async fn test_cache_match_ignore_params_finds_revisioned_entry() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("precache").await.unwrap();
        let stored = Request::get("https://example.com/app.js?__WB_REVISION__=abc").unwrap();
        cache.put(&stored, Response::ok("old")).await.unwrap();

        let lookup = Request::get("https://example.com/app.js?__WB_REVISION__=def").unwrap();
        let found = cache_match_ignore_params(
            cache.as_ref(),
            &lookup,
            &[REVISION_SEARCH_PARAM],
            &MatchOptions::default(),
        )
        .await
        .unwrap()
        .expect("old revision should be found");
        assert_eq!(found.body(), "old");
    }
}
