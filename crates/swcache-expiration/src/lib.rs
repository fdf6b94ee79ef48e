//! Cache expiration for swcache runtime caches
//!
//! Expiration tracks when each cached URL was last used and evicts entries
//! that are too old or beyond a maximum count, least recently used first.
//!
//! - [`TimestampStore`]: persistent `cache_name|url -> timestamp` table with
//!   memory and JSON-file engines
//! - [`CacheTimestampsModel`]: one cache's view of the table and the
//!   single-pass eviction scan
//! - [`CacheExpiration`]: applies an [`ExpirationConfig`] to one cache, with
//!   coalesced eviction passes
//! - [`ExpirationPlugin`]: strategy plugin that wires the above into cache
//!   reads and writes through an [`ExpirationRegistry`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swcache_core::{MemoryCacheStorage, StubFetcher, WorkerScope};
//! use swcache_expiration::{ExpirationConfig, ExpirationPlugin, MemoryTimestampStore};
//! use swcache_strategies::{CacheFirst, StrategyConfig};
//!
//! # fn example() -> Result<(), swcache_core::SwError> {
//! let scope = WorkerScope::new(
//!     url::Url::parse("https://example.com/")?,
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(StubFetcher::new()),
//! );
//! let expiration = ExpirationPlugin::new(
//!     &scope,
//!     Arc::new(MemoryTimestampStore::new()),
//!     ExpirationConfig::new().with_max_entries(50).with_max_age_seconds(86_400),
//! )?;
//! let images = CacheFirst::new(
//!     scope,
//!     StrategyConfig::new()
//!         .with_cache_name("images")
//!         .with_plugin(Arc::new(expiration)),
//! );
//! # let _ = images;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod config;
pub mod manager;
pub mod model;
pub mod plugin;
pub mod registry;
pub mod store;

pub use config::ExpirationConfig;
pub use manager::CacheExpiration;
pub use model::CacheTimestampsModel;
pub use plugin::ExpirationPlugin;
pub use registry::ExpirationRegistry;
pub use store::{FileTimestampStore, MemoryTimestampStore, TimestampRecord, TimestampStore};
