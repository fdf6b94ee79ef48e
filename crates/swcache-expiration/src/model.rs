//! Per-cache view of the timestamp store

use crate::store::{TimestampRecord, TimestampStore};
use std::sync::Arc;
use swcache_core::{SwResult, key::strip_fragment};
use url::Url;

/// Timestamps of the URLs in one cache
#[derive(Clone)]
pub struct CacheTimestampsModel {
    cache_name: String,
    store: Arc<dyn TimestampStore>,
}

impl std::fmt::Debug for CacheTimestampsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTimestampsModel")
            .field("cache_name", &self.cache_name)
            .finish_non_exhaustive()
    }
}

impl CacheTimestampsModel {
    pub fn new(cache_name: impl Into<String>, store: Arc<dyn TimestampStore>) -> Self {
        Self {
            cache_name: cache_name.into(),
            store,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    fn id(&self, url: &Url) -> String {
        format!("{}|{}", self.cache_name, strip_fragment(url))
    }

    /// Record `timestamp` (ms since epoch) as the last use of `url`
    pub async fn set_timestamp(&self, url: &Url, timestamp: i64) -> SwResult<()> {
        let url = strip_fragment(url);
        self.store
            .put(TimestampRecord {
                id: self.id(&url),
                url: url.to_string(),
                timestamp,
                cache_name: self.cache_name.clone(),
            })
            .await
    }

    pub async fn get_timestamp(&self, url: &Url) -> SwResult<Option<i64>> {
        Ok(self.store.get(&self.id(url)).await?.map(|r| r.timestamp))
    }

    /// Remove records older than `min_timestamp`, and every record past the
    /// newest `max_entries`; returns the removed URLs
    ///
    /// `None` disables the corresponding bound.
    pub async fn expire_entries(
        &self,
        min_timestamp: Option<i64>,
        max_entries: Option<usize>,
    ) -> SwResult<Vec<String>> {
        let mut kept = 0usize;
        let mut expired = Vec::new();
        for record in self.store.scan_newest_first(&self.cache_name).await? {
            let too_old = min_timestamp.is_some_and(|min| record.timestamp < min);
            let over_limit = max_entries.is_some_and(|max| kept >= max);
            if too_old || over_limit {
                expired.push(record);
            } else {
                kept += 1;
            }
        }

        let mut urls = Vec::with_capacity(expired.len());
        for record in expired {
            self.store.delete(&record.id).await?;
            urls.push(record.url);
        }
        Ok(urls)
    }

    /// Remove every record of this cache
    pub async fn clear(&self) -> SwResult<()> {
        self.store.clear(&self.cache_name).await
    }
}
