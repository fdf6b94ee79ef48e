//! JSON-file timestamp store
//!
//! The whole table is loaded when the store is opened and rewritten after
//! every mutation through a temp file and rename, so a crash leaves either
//! the old or the new table on disk.

use super::{TimestampIndex, TimestampRecord, TimestampStore};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use swcache_core::SwResult;
use tokio::{fs, sync::Mutex};

/// Timestamp store persisted to a single JSON file
#[derive(Debug)]
pub struct FileTimestampStore {
    path: PathBuf,
    // Held across the file write so snapshots reach disk in mutation order
    index: Mutex<TimestampIndex>,
}

impl FileTimestampStore {
    /// Open the store at `path`, loading existing records
    pub async fn open(path: impl Into<PathBuf>) -> SwResult<Self> {
        let path = path.into();
        let records: Vec<TimestampRecord> = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            "Loaded {} timestamp records from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            index: Mutex::new(TimestampIndex::from_records(records)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, index: &TimestampIndex) -> SwResult<()> {
        let data = serde_json::to_vec_pretty(&index.records())?;
        let temp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TimestampStore for FileTimestampStore {
    async fn put(&self, record: TimestampRecord) -> SwResult<()> {
        let mut index = self.index.lock().await;
        index.put(record);
        self.persist(&index).await
    }

    async fn get(&self, id: &str) -> SwResult<Option<TimestampRecord>> {
        Ok(self.index.lock().await.get(id))
    }

    async fn delete(&self, id: &str) -> SwResult<()> {
        let mut index = self.index.lock().await;
        if index.delete(id) {
            self.persist(&index).await?;
        }
        Ok(())
    }

    async fn scan_newest_first(&self, cache_name: &str) -> SwResult<Vec<TimestampRecord>> {
        Ok(self.index.lock().await.scan_newest_first(cache_name))
    }

    async fn clear(&self, cache_name: &str) -> SwResult<()> {
        let mut index = self.index.lock().await;
        if index.clear(cache_name) > 0 {
            self.persist(&index).await?;
        }
        Ok(())
    }
}
