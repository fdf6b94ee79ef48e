//! In-process timestamp store

use super::{TimestampIndex, TimestampRecord, TimestampStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use swcache_core::SwResult;

/// Timestamp store kept in memory for the life of the process
#[derive(Debug, Default)]
pub struct MemoryTimestampStore {
    index: RwLock<TimestampIndex>,
}

impl MemoryTimestampStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TimestampStore for MemoryTimestampStore {
    async fn put(&self, record: TimestampRecord) -> SwResult<()> {
        self.index.write().put(record);
        Ok(())
    }

    async fn get(&self, id: &str) -> SwResult<Option<TimestampRecord>> {
        Ok(self.index.read().get(id))
    }

    async fn delete(&self, id: &str) -> SwResult<()> {
        self.index.write().delete(id);
        Ok(())
    }

    async fn scan_newest_first(&self, cache_name: &str) -> SwResult<Vec<TimestampRecord>> {
        Ok(self.index.read().scan_newest_first(cache_name))
    }

    async fn clear(&self, cache_name: &str) -> SwResult<()> {
        self.index.write().clear(cache_name);
        Ok(())
    }
}
