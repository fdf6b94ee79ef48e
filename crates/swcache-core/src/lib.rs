//! Core model and collaborators for swcache offline caching
//!
//! This crate holds everything the caching pipeline shares but does not
//! decide policy for:
//!
//! - **Request/response model**: [`Request`], [`Response`] and the fetch
//!   standard enums they carry
//! - **Cache key normalization**: fragment and tracking-parameter removal,
//!   candidate URL generation for precache lookups
//! - **Response store**: the [`CacheStorage`]/[`Cache`] traits with in-memory
//!   and on-disk backends
//! - **Network**: the [`Fetcher`] trait, a reqwest implementation and a
//!   scripted stub
//! - **Scope wiring**: [`WorkerScope`] bundles origin, store, fetcher, cache
//!   names and the quota-exceeded callback registry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │    Router    │──▶│   Strategy   │──▶│   Plugins    │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!        ┌──────────────┐        ┌──────────────┐
//!        │ CacheStorage │        │   Fetcher    │
//!        └──────────────┘        └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use swcache_core::{MemoryCacheStorage, Request, Response, StubFetcher, WorkerScope};
//!
//! # async fn example() -> Result<(), swcache_core::SwError> {
//! let scope = WorkerScope::new(
//!     url::Url::parse("https://example.com/")?,
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(StubFetcher::new()),
//! );
//!
//! let cache = scope.caches().open("images").await?;
//! cache
//!     .put(&Request::get("https://example.com/logo.png")?, Response::ok("png"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod cache_names;
pub mod error;
pub mod event;
pub mod http;
pub mod key;
pub mod network;
pub mod quota;
pub mod scope;
pub mod storage;

pub use cache_names::CacheNames;
pub use error::{SwError, SwResult};
pub use event::{HandlerEvent, RouteParams};
pub use http::{
    CacheMode, Credentials, Request, RequestInit, RequestMode, Response, ResponseType,
};
pub use key::{
    REVISION_SEARCH_PARAM, UrlVariationOptions, UrlVariations, default_ignored_params,
    generate_url_variations, normalize_url, remove_ignored_search_params, remove_search_params,
    strip_fragment,
};
pub use network::{Fetcher, HttpFetcher, HttpFetcherConfig, StubFetcher, StubOutcome};
pub use quota::{QuotaCallback, QuotaCallbacks};
pub use scope::{ScopeConfig, WorkerScope};
pub use storage::{
    Cache, CacheStorage, DiskCacheStorage, MatchOptions, MemoryCacheStorage,
    cache_match_ignore_params,
};
