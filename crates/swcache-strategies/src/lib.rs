//! Request-handling strategies for swcache
//!
//! A [`Strategy`] turns a request into a response by combining the network
//! and the response store in a fixed policy. Each request gets its own
//! [`StrategyHandler`], which runs the configured [`StrategyPlugin`] hooks
//! around every cache read, cache write and fetch, and tracks background
//! work so callers can wait for it through [`HandlerCompletion`].
//!
//! Built-in strategies:
//!
//! | Strategy | Order |
//! |----------|-------|
//! | [`CacheFirst`] | cache, then network (cached) |
//! | [`CacheOnly`] | cache |
//! | [`NetworkFirst`] | network (cached), then cache |
//! | [`NetworkOnly`] | network |
//! | [`StaleWhileRevalidate`] | cache while the network refreshes it |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swcache_core::{MemoryCacheStorage, Request, StubFetcher, WorkerScope};
//! use swcache_strategies::{CacheFirst, Strategy, StrategyConfig};
//!
//! # async fn example() -> Result<(), swcache_core::SwError> {
//! let scope = WorkerScope::new(
//!     url::Url::parse("https://example.com/")?,
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(StubFetcher::new()),
//! );
//! let images = CacheFirst::new(scope, StrategyConfig::new().with_cache_name("images"));
//!
//! let (response, done) = images
//!     .handle_all(Request::get("https://example.com/logo.png")?.into())
//!     .await;
//! let _ = response?;
//! done.wait().await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod handler;
pub mod plugin;
pub mod strategies;
pub mod strategy;

pub use handler::StrategyHandler;
pub use plugin::{
    CacheDidUpdateParams, CacheKeyMode, CacheKeyWillBeUsedParams, CacheOkAndOpaquePlugin,
    CacheWillUpdateParams, CachedResponseWillBeUsedParams, FetchDidFailParams,
    FetchDidSucceedParams, HandlerDidCompleteParams, HandlerDidErrorParams,
    HandlerDidRespondParams, HandlerWillRespondParams, HandlerWillStartParams, HookContext,
    PluginHook, PluginState, RequestWillFetchParams, StrategyPlugin,
};
pub use strategies::{CacheFirst, CacheOnly, NetworkFirst, NetworkOnly, StaleWhileRevalidate};
pub use strategy::{
    HandlerCompletion, HandlerFn, HandlerOptions, RouteHandler, Strategy, StrategyConfig,
    StrategyCore, handler_fn,
};
