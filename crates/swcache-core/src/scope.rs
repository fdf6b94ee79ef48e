//! Worker scope: the collaborators one caching deployment shares
//!
//! Routers, strategies, the precache controller and the expiration registry
//! all receive a [`WorkerScope`] instead of reaching for process globals.

use crate::{
    cache_names::CacheNames,
    error::{SwError, SwResult},
    network::{Fetcher, HttpFetcher, HttpFetcherConfig},
    quota::QuotaCallbacks,
    storage::{CacheStorage, DiskCacheStorage, MemoryCacheStorage},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use url::Url;

/// Configuration for building a [`WorkerScope`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Origin that same-origin checks and relative URLs resolve against
    pub origin: String,
    /// Cache name configuration
    pub cache_names: CacheNames,
    /// Directory of the persistent cache store; in-memory when unset
    pub store_dir: Option<PathBuf>,
    /// Byte quota of the in-memory store
    pub quota_bytes: Option<usize>,
    /// Network request timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost/".to_string(),
            cache_names: CacheNames::default(),
            store_dir: None,
            quota_bytes: None,
            fetch_timeout_secs: 30,
        }
    }
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let origin = Url::parse(&self.origin).map_err(|e| format!("invalid origin: {e}"))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err("origin must use http or https".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be greater than 0".to_string());
        }
        if self.store_dir.is_some() && self.quota_bytes.is_some() {
            return Err("quota_bytes only applies to the in-memory store".to_string());
        }
        self.cache_names.validate()
    }
}

/// Shared collaborators of one deployment
#[derive(Clone)]
pub struct WorkerScope {
    origin: Url,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    quota: QuotaCallbacks,
    cache_names: CacheNames,
}

impl std::fmt::Debug for WorkerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerScope")
            .field("origin", &self.origin.as_str())
            .field("cache_names", &self.cache_names)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl WorkerScope {
    /// Wire a scope from explicit collaborators
    pub fn new(origin: Url, caches: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            origin,
            caches,
            fetcher,
            quota: QuotaCallbacks::new(),
            cache_names: CacheNames::default(),
        }
    }

    /// Build a scope from configuration with the reqwest fetcher
    pub async fn from_config(config: &ScopeConfig) -> SwResult<Self> {
        config.validate().map_err(SwError::InvalidConfiguration)?;
        let origin = Url::parse(&config.origin)?;

        let caches: Arc<dyn CacheStorage> = match (&config.store_dir, config.quota_bytes) {
            (Some(dir), _) => Arc::new(DiskCacheStorage::open_at(dir).await?),
            (None, Some(quota)) => Arc::new(MemoryCacheStorage::with_quota(quota)),
            (None, None) => Arc::new(MemoryCacheStorage::new()),
        };
        let http_config =
            HttpFetcherConfig::new().with_timeout(Duration::from_secs(config.fetch_timeout_secs));
        let fetcher = Arc::new(HttpFetcher::with_config(origin.clone(), &http_config)?);

        tracing::info!(
            "Worker scope for {} using {} store",
            origin,
            if config.store_dir.is_some() { "disk" } else { "memory" }
        );
        Ok(Self::new(origin, caches, fetcher).with_cache_names(config.cache_names.clone()))
    }

    pub fn with_cache_names(mut self, cache_names: CacheNames) -> Self {
        self.cache_names = cache_names;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn caches(&self) -> &Arc<dyn CacheStorage> {
        &self.caches
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Quota-exceeded callback registry shared by everything in this scope
    pub fn quota(&self) -> &QuotaCallbacks {
        &self.quota
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.cache_names
    }

    /// Resolve a possibly relative URL against the scope origin
    pub fn resolve(&self, url: &str) -> SwResult<Url> {
        Ok(self.origin.join(url)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::network::StubFetcher;

    #[test]
    fn test_config_validation() {
        assert!(ScopeConfig::default().validate().is_ok());
        assert!(ScopeConfig::new().with_origin("ftp://example.com").validate().is_err());
        assert!(ScopeConfig::new().with_origin("not a url").validate().is_err());

        let mut config = ScopeConfig::new().with_store_dir("/tmp/store");
        config.quota_bytes = Some(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: ScopeConfig =
            serde_json::from_str(r#"{"origin":"https://example.com/","cache_names":{"prefix":"app"}}"#)
                .unwrap();
        assert_eq!(config.cache_names.prefix, "app");
        assert_eq!(config.cache_names.runtime, "runtime");
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_resolve_relative_urls() {
        let scope = WorkerScope::new(
            Url::parse("https://example.com/app/").unwrap(),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubFetcher::new()),
        );
        assert_eq!(
            scope.resolve("main.js").unwrap().as_str(),
            "https://example.com/app/main.js"
        );
        assert_eq!(
            scope.resolve("/index.html").unwrap().as_str(),
            "https://example.com/index.html"
        );
    }

    #[tokio::test]
    async fn test_from_config_with_disk_store() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let config = ScopeConfig::new()
            .with_origin("https://example.com/")
            .with_store_dir(temp_dir.path());
        let scope = WorkerScope::from_config(&config).await.unwrap();
        scope.caches().open("runtime").await.unwrap();
        assert!(temp_dir.path().join("caches.json").exists());
    }
}
