//! Precaching for swcache
//!
//! A precache is filled ahead of time from a manifest of URLs, each
//! optionally pinned to a revision. Revisioned entries are stored under a
//! cache key carrying a `__WB_REVISION__` query parameter, so a new revision
//! gets a new key while the fetched URL stays the same.
//!
//! - [`PrecacheEntry`]: manifest entry, parsed from the JSON manifest format
//! - [`PrecacheController`]: registers entries, runs install and activate,
//!   and answers lookups
//! - [`PrecacheStrategy`]: cache-first strategy over the precache
//! - [`PrecacheRoute`] and [`precache_and_route`]: route requests for
//!   manifest URLs, including their `index.html` and `.html` variants
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swcache_core::{MemoryCacheStorage, StubFetcher, WorkerScope};
//! use swcache_precaching::{
//!     PrecacheController, PrecacheEntry, PrecacheOptions, PrecacheRouteOptions,
//!     precache_and_route,
//! };
//! use swcache_routing::Router;
//!
//! # async fn example() -> Result<(), swcache_core::SwError> {
//! let origin = url::Url::parse("https://example.com/")?;
//! let scope = WorkerScope::new(
//!     origin.clone(),
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(StubFetcher::new()),
//! );
//! let controller = PrecacheController::new(scope, PrecacheOptions::new());
//! let router = Router::new(origin);
//!
//! let entries = PrecacheEntry::parse_manifest(
//!     r#"["/index.html", {"url": "/app.js", "revision": "abc"}]"#,
//! )?;
//! precache_and_route(&controller, &router, &entries, &PrecacheRouteOptions::new())?;
//!
//! let installed = controller.install().await?;
//! println!("fetched {} URLs", installed.updated_urls.len());
//! controller.activate().await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod controller;
pub mod entry;
pub mod plugins;
pub mod route;
pub mod strategy;

pub use controller::{ActivateResult, InstallResult, PrecacheController, PrecacheOptions};
pub use entry::{CacheKeyedEntry, PrecacheEntry, RevisionedEntry, create_cache_key};
pub use plugins::{CacheKeyPlugin, InstallReportPlugin};
pub use route::{PrecacheRoute, PrecacheRouteOptions, precache_and_route};
pub use strategy::{CopyRedirectedPlugin, PrecacheCacheabilityPlugin, PrecacheStrategy};
