//! Request routing for swcache
//!
//! A [`Router`] holds [`Route`]s per HTTP method. Each route pairs a matcher
//! with a [`RouteHandler`](swcache_strategies::RouteHandler), usually one of
//! the caching strategies. The router also understands the `CACHE_URLS`
//! control message, which warms caches by routing a list of requests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use http::Method;
//! use regex::Regex;
//! use swcache_core::{HandlerEvent, MemoryCacheStorage, Request, StubFetcher, WorkerScope};
//! use swcache_routing::{Capture, Router};
//! use swcache_strategies::{CacheFirst, StrategyConfig};
//!
//! # async fn example() -> Result<(), swcache_core::SwError> {
//! let origin = url::Url::parse("https://example.com/")?;
//! let scope = WorkerScope::new(
//!     origin.clone(),
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(StubFetcher::new()),
//! );
//! let router = Router::new(origin);
//! router.register_capture(
//!     Capture::Regex(Regex::new(r"\.png$").map_err(|e| {
//!         swcache_core::SwError::InvalidConfiguration(e.to_string())
//!     })?),
//!     Arc::new(CacheFirst::new(scope, StrategyConfig::new().with_cache_name("images"))),
//!     Method::GET,
//! )?;
//!
//! let request = Request::get("https://example.com/logo.png")?;
//! if let Some(response) = router.handle_request(request, HandlerEvent::fetch()).await {
//!     println!("status {}", response?.status());
//! }
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod message;
pub mod route;
pub mod router;

pub use message::{CacheUrlEntry, CacheUrlsPayload, RouterMessage};
pub use route::{Capture, MatchContext, MatchFn, MatchResult, Route};
pub use router::Router;
