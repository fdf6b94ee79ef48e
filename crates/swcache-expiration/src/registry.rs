//! Lazily-populated expiration managers keyed by cache name

use crate::{config::ExpirationConfig, manager::CacheExpiration, store::TimestampStore};
use dashmap::DashMap;
use std::sync::Arc;
use swcache_core::{CacheStorage, SwError, SwResult};

struct RegistryInner {
    caches: Arc<dyn CacheStorage>,
    store: Arc<dyn TimestampStore>,
    config: ExpirationConfig,
    /// Shared default runtime cache, which may not be expired
    runtime_cache_name: String,
    managers: DashMap<String, Arc<CacheExpiration>>,
}

/// Expiration managers sharing one configuration and timestamp store
///
/// Cloning yields a handle to the same registry.
#[derive(Clone)]
pub struct ExpirationRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for ExpirationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationRegistry")
            .field("config", &self.inner.config)
            .field("managers", &self.inner.managers.len())
            .finish_non_exhaustive()
    }
}

impl ExpirationRegistry {
    pub fn new(
        caches: Arc<dyn CacheStorage>,
        store: Arc<dyn TimestampStore>,
        config: ExpirationConfig,
        runtime_cache_name: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                caches,
                store,
                config,
                runtime_cache_name: runtime_cache_name.into(),
                managers: DashMap::new(),
            }),
        }
    }

    /// Manager for `cache_name`, created on first use
    pub fn get_or_create(&self, cache_name: &str) -> SwResult<Arc<CacheExpiration>> {
        if cache_name == self.inner.runtime_cache_name {
            return Err(SwError::ExpireCustomCachesOnly);
        }

        let manager = self
            .inner
            .managers
            .entry(cache_name.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating expiration manager for {cache_name}");
                Arc::new(CacheExpiration::new(
                    cache_name,
                    self.inner.config.clone(),
                    Arc::clone(&self.inner.caches),
                    Arc::clone(&self.inner.store),
                ))
            })
            .clone();
        Ok(manager)
    }

    pub fn get(&self, cache_name: &str) -> Option<Arc<CacheExpiration>> {
        self.inner.managers.get(cache_name).map(|m| Arc::clone(m.value()))
    }

    /// Names of the caches with a manager
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .managers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.managers.is_empty()
    }

    /// Delete every managed cache and its timestamp records, then forget the
    /// managers
    pub async fn delete_cache_and_metadata(&self) -> SwResult<()> {
        let managers: Vec<(String, Arc<CacheExpiration>)> = self
            .inner
            .managers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (cache_name, manager) in managers {
            self.inner.caches.delete(&cache_name).await?;
            manager.delete().await?;
            self.inner.managers.remove(&cache_name);
            tracing::info!("Deleted cache {cache_name} and its expiration data");
        }
        Ok(())
    }
}
