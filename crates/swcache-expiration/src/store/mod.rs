//! Persistent timestamp store
//!
//! One logical table of [`TimestampRecord`]s keyed by id, with a secondary
//! ordering on timestamp so a cache's records can be scanned newest first.

mod file;
mod memory;

pub use file::FileTimestampStore;
pub use memory::MemoryTimestampStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use swcache_core::SwResult;

/// Last-used time of one cached URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampRecord {
    /// `cache_name|url`
    pub id: String,
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub cache_name: String,
}

/// Storage engine for timestamp records
#[async_trait]
pub trait TimestampStore: Send + Sync {
    /// Insert or replace a record by id
    async fn put(&self, record: TimestampRecord) -> SwResult<()>;

    async fn get(&self, id: &str) -> SwResult<Option<TimestampRecord>>;

    /// Delete a record; deleting a missing id is not an error
    async fn delete(&self, id: &str) -> SwResult<()>;

    /// Every record of `cache_name`, newest timestamp first
    async fn scan_newest_first(&self, cache_name: &str) -> SwResult<Vec<TimestampRecord>>;

    /// Delete every record of `cache_name`
    async fn clear(&self, cache_name: &str) -> SwResult<()>;
}

/// Records by id plus a `(timestamp, id)` ordered index
#[derive(Debug, Default)]
pub(crate) struct TimestampIndex {
    records: HashMap<String, TimestampRecord>,
    by_time: BTreeSet<(i64, String)>,
}

impl TimestampIndex {
    pub(crate) fn from_records(records: impl IntoIterator<Item = TimestampRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.put(record);
        }
        index
    }

    pub(crate) fn put(&mut self, record: TimestampRecord) {
        if let Some(old) = self.records.get(&record.id) {
            self.by_time.remove(&(old.timestamp, old.id.clone()));
        }
        self.by_time.insert((record.timestamp, record.id.clone()));
        self.records.insert(record.id.clone(), record);
    }

    pub(crate) fn get(&self, id: &str) -> Option<TimestampRecord> {
        self.records.get(id).cloned()
    }

    pub(crate) fn delete(&mut self, id: &str) -> bool {
        match self.records.remove(id) {
            Some(old) => {
                self.by_time.remove(&(old.timestamp, old.id));
                true
            }
            None => false,
        }
    }

    pub(crate) fn scan_newest_first(&self, cache_name: &str) -> Vec<TimestampRecord> {
        self.by_time
            .iter()
            .rev()
            .filter_map(|(_, id)| self.records.get(id))
            .filter(|record| record.cache_name == cache_name)
            .cloned()
            .collect()
    }

    pub(crate) fn clear(&mut self, cache_name: &str) -> usize {
        let ids: Vec<String> = self
            .records
            .values()
            .filter(|record| record.cache_name == cache_name)
            .map(|record| record.id.clone())
            .collect();
        for id in &ids {
            self.delete(id);
        }
        ids.len()
    }

    /// Records in timestamp order, for serialization
    pub(crate) fn records(&self) -> Vec<&TimestampRecord> {
        self.by_time
            .iter()
            .filter_map(|(_, id)| self.records.get(id))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
