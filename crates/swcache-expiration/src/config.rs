//! Expiration configuration

use serde::{Deserialize, Serialize};
use swcache_core::MatchOptions;

/// Limits applied to a runtime cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpirationConfig {
    /// Keep at most this many entries, evicting the least recently used
    pub max_entries: Option<usize>,
    /// Evict entries not used for this long
    pub max_age_seconds: Option<u64>,
    /// Options used when deleting evicted entries from the cache
    pub match_options: MatchOptions,
    /// Delete the managed caches when a cache write exceeds the quota
    pub purge_on_quota_error: bool,
}

impl ExpirationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_age_seconds(mut self, seconds: u64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }

    pub fn with_purge_on_quota_error(mut self, purge: bool) -> Self {
        self.purge_on_quota_error = purge;
        self
    }

    /// Maximum age in milliseconds, if configured
    pub(crate) fn max_age_ms(&self) -> Option<i64> {
        self.max_age_seconds
            .map(|seconds| i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries.is_none() && self.max_age_seconds.is_none() {
            return Err("at least one of max_entries or max_age_seconds must be set".to_string());
        }

        if self.max_entries == Some(0) {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.max_age_seconds == Some(0) {
            return Err("max_age_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}
