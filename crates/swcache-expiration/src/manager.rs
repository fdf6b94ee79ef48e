//! Cache expiration manager
//!
//! A [`CacheExpiration`] enforces an [`ExpirationConfig`] on one named cache.
//! Eviction passes are coalesced: while a pass runs, further requests only
//! mark a rerun, and one more pass is spawned after the current one ends.

use crate::{config::ExpirationConfig, model::CacheTimestampsModel, store::TimestampStore};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use swcache_core::{CacheStorage, Request, SwResult};
use url::Url;

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    rerun_requested: bool,
}

/// Marks a pass as running until finished or dropped
struct RunningGuard<'a> {
    state: &'a Mutex<RunState>,
    finished: bool,
}

impl<'a> RunningGuard<'a> {
    /// Claim the running slot, or record a rerun if a pass holds it
    fn acquire(state: &'a Mutex<RunState>) -> Option<Self> {
        let mut current = state.lock();
        if current.running {
            current.rerun_requested = true;
            return None;
        }
        current.running = true;
        Some(Self {
            state,
            finished: false,
        })
    }

    /// End the pass, returning whether a rerun was requested during it
    fn finish(mut self) -> bool {
        self.finished = true;
        let mut state = self.state.lock();
        state.running = false;
        std::mem::take(&mut state.rerun_requested)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.lock().running = false;
        }
    }
}

/// Expiration manager for one cache
pub struct CacheExpiration {
    cache_name: String,
    config: ExpirationConfig,
    model: CacheTimestampsModel,
    caches: Arc<dyn CacheStorage>,
    state: Mutex<RunState>,
    passes: AtomicUsize,
}

impl std::fmt::Debug for CacheExpiration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheExpiration")
            .field("cache_name", &self.cache_name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl CacheExpiration {
    pub fn new(
        cache_name: impl Into<String>,
        config: ExpirationConfig,
        caches: Arc<dyn CacheStorage>,
        store: Arc<dyn TimestampStore>,
    ) -> Self {
        let cache_name = cache_name.into();
        Self {
            model: CacheTimestampsModel::new(cache_name.clone(), store),
            cache_name,
            config,
            caches,
            state: Mutex::new(RunState::default()),
            passes: AtomicUsize::new(0),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &ExpirationConfig {
        &self.config
    }

    /// Number of eviction passes that have started
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    /// Whether an eviction pass is in flight
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Evict entries over the configured limits
    ///
    /// Returns immediately when a pass is already running; that pass is then
    /// followed by exactly one more.
    pub fn expire_entries(self: &Arc<Self>) -> BoxFuture<'static, SwResult<()>> {
        let this = Arc::clone(self);
        async move {
            let Some(guard) = RunningGuard::acquire(&this.state) else {
                return Ok(());
            };
            let result = this.run_pass().await;
            if guard.finish() {
                let next = this.expire_entries();
                let cache_name = this.cache_name.clone();
                tokio::spawn(async move {
                    if let Err(e) = next.await {
                        tracing::warn!("Expiration rerun for {cache_name} failed: {e}");
                    }
                });
            }
            result
        }
        .boxed()
    }

    async fn run_pass(&self) -> SwResult<()> {
        self.passes.fetch_add(1, Ordering::Relaxed);
        let min_timestamp = self.config.max_age_ms().map(|age| now_ms() - age);
        let expired = self
            .model
            .expire_entries(min_timestamp, self.config.max_entries)
            .await?;
        if expired.is_empty() {
            return Ok(());
        }

        let cache = self.caches.open(&self.cache_name).await?;
        for url in &expired {
            let request = Request::new(Url::parse(url)?);
            cache.delete(&request, &self.config.match_options).await?;
        }
        tracing::debug!(
            "Expired {} entries from cache {}",
            expired.len(),
            self.cache_name
        );
        Ok(())
    }

    /// Record now as the last use of `url`
    pub async fn update_timestamp(&self, url: &Url) -> SwResult<()> {
        self.model.set_timestamp(url, now_ms()).await
    }

    /// Whether `url` is older than the maximum age
    ///
    /// Always `false` without a maximum age; a URL with no timestamp counts as
    /// expired.
    pub async fn is_url_expired(&self, url: &Url) -> SwResult<bool> {
        let Some(max_age) = self.config.max_age_ms() else {
            return Ok(false);
        };
        let cutoff = now_ms() - max_age;
        Ok(self
            .model
            .get_timestamp(url)
            .await?
            .is_none_or(|timestamp| timestamp < cutoff))
    }

    /// Drop any pending rerun and remove every timestamp record of this cache
    pub async fn delete(&self) -> SwResult<()> {
        self.state.lock().rerun_requested = false;
        self.model.clear().await
    }
}
