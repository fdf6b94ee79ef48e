//! In-memory cache store with an optional byte quota

use super::{Cache, CacheStorage, MatchOptions, request_matches, validate_put};
use crate::{
    error::{SwError, SwResult},
    http::{Request, Response},
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

struct StoredEntry {
    request: Request,
    response: Response,
}

/// One named in-memory cache
pub struct MemoryCache {
    entries: RwLock<Vec<StoredEntry>>,
    usage: Arc<AtomicUsize>,
    quota_bytes: Option<usize>,
    /// Set once the storage deleted this cache; handles still held by
    /// callers keep working but no longer count towards the shared usage
    detached: AtomicBool,
}

impl MemoryCache {
    fn new(usage: Arc<AtomicUsize>, quota_bytes: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            usage,
            quota_bytes,
            detached: AtomicBool::new(false),
        }
    }

    /// Swap `released` bytes for `added` in one atomic step, failing when
    /// the result would exceed the quota
    fn charge(&self, released: usize, added: usize) -> SwResult<()> {
        if self.detached.load(Ordering::Acquire) {
            return Ok(());
        }
        let quota = self.quota_bytes;
        self.usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let projected = current.saturating_sub(released).saturating_add(added);
                match quota {
                    Some(quota) if projected > quota => None,
                    _ => Some(projected),
                }
            })
            .map(|_| ())
            .map_err(|_| SwError::QuotaExceeded)
    }

    fn release(&self, bytes: usize) {
        if bytes == 0 || self.detached.load(Ordering::Acquire) {
            return;
        }
        let _ = self
            .usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Give back the bytes this cache holds and stop counting towards the
    /// shared usage
    fn detach(&self) {
        let entries = self.entries.write();
        let held: usize = entries.iter().map(|e| e.response.body().len()).sum();
        self.release(held);
        self.detached.store(true, Ordering::Release);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> SwResult<Option<Response>> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|entry| {
                request_matches(request, entry.request.method(), entry.request.url(), options)
            })
            .map(|entry| entry.response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> SwResult<()> {
        validate_put(request, &response)?;

        let new_size = response.body().len();
        let mut entries = self.entries.write();
        let exact = MatchOptions::default();
        let old_size: usize = entries
            .iter()
            .filter(|e| request_matches(request, e.request.method(), e.request.url(), &exact))
            .map(|e| e.response.body().len())
            .sum();

        self.charge(old_size, new_size)?;

        entries.retain(|e| !request_matches(request, e.request.method(), e.request.url(), &exact));
        entries.push(StoredEntry {
            request: request.clone(),
            response,
        });
        Ok(())
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> SwResult<bool> {
        let mut entries = self.entries.write();
        let before = entries.len();
        let mut freed = 0;
        entries.retain(|e| {
            let matched = request_matches(request, e.request.method(), e.request.url(), options);
            if matched {
                freed += e.response.body().len();
            }
            !matched
        });
        self.release(freed);
        Ok(entries.len() != before)
    }

    async fn keys(
        &self,
        request: Option<&Request>,
        options: &MatchOptions,
    ) -> SwResult<Vec<Request>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| {
                request.is_none_or(|r| {
                    request_matches(r, e.request.method(), e.request.url(), options)
                })
            })
            .map(|e| e.request.clone())
            .collect())
    }
}

/// In-memory [`CacheStorage`]
///
/// The quota, when set, bounds the total body bytes across every cache.
pub struct MemoryCacheStorage {
    caches: DashMap<String, (u64, Arc<MemoryCache>)>,
    next_sequence: AtomicU64,
    usage: Arc<AtomicUsize>,
    quota_bytes: Option<usize>,
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStorage {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
            next_sequence: AtomicU64::new(0),
            usage: Arc::new(AtomicUsize::new(0)),
            quota_bytes: None,
        }
    }

    /// Create a store that rejects writes beyond `quota_bytes` of body data
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Body bytes currently stored across all caches
    pub fn usage_bytes(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache_name: &str) -> SwResult<Arc<dyn Cache>> {
        let entry = self.caches.entry(cache_name.to_string()).or_insert_with(|| {
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            (
                sequence,
                Arc::new(MemoryCache::new(Arc::clone(&self.usage), self.quota_bytes)),
            )
        });
        let cache: Arc<dyn Cache> = Arc::clone(&entry.value().1) as Arc<dyn Cache>;
        Ok(cache)
    }

    async fn has(&self, cache_name: &str) -> SwResult<bool> {
        Ok(self.caches.contains_key(cache_name))
    }

    async fn delete(&self, cache_name: &str) -> SwResult<bool> {
        match self.caches.remove(cache_name) {
            Some((_, (_, cache))) => {
                cache.detach();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        let mut names: Vec<(u64, String)> = self
            .caches
            .iter()
            .map(|entry| (entry.value().0, entry.key().clone()))
            .collect();
        names.sort_unstable();
        Ok(names.into_iter().map(|(_, name)| name).collect())
    }
}
