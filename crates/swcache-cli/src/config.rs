//! Configuration loading
//!
//! A JSON file supplies the [`ScopeConfig`]; `--origin` and `--store`
//! override its fields. Without a file the defaults apply.

use crate::Cli;
use anyhow::Context;
use std::{path::Path, sync::Arc};
use swcache_core::ScopeConfig;
use swcache_expiration::{FileTimestampStore, MemoryTimestampStore, TimestampStore};

/// File in the store directory holding expiration timestamps
pub const TIMESTAMPS_FILE: &str = "timestamps.json";

/// Read a configuration file
pub fn read_config_file(path: &Path) -> anyhow::Result<ScopeConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing config {}", path.display()))
}

/// Resolve the scope configuration for a command line
pub fn load_scope_config(cli: &Cli) -> anyhow::Result<ScopeConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => ScopeConfig::default(),
    };
    if let Some(origin) = &cli.origin {
        config.origin.clone_from(origin);
    }
    if let Some(store) = &cli.store {
        config.store_dir = Some(store.clone());
    }

    config.validate().map_err(anyhow::Error::msg)?;
    tracing::debug!("Resolved configuration: {config:?}");
    Ok(config)
}

/// Timestamp store next to the cache store, or in memory when the caches are
pub async fn timestamp_store(config: &ScopeConfig) -> anyhow::Result<Arc<dyn TimestampStore>> {
    match &config.store_dir {
        Some(dir) => {
            let store = FileTimestampStore::open(dir.join(TIMESTAMPS_FILE))
                .await
                .context("opening timestamp store")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryTimestampStore::new())),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swcache.json");
        std::fs::write(
            &path,
            r#"{"origin": "https://file.test/", "cache_names": {"prefix": "site"}, "fetch_timeout_secs": 5}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "swcache",
            "--config",
            path.to_str().unwrap(),
            "--origin",
            "https://flag.test/",
            "list",
        ])
        .unwrap();
        let config = load_scope_config(&cli).unwrap();
        assert_eq!(config.origin, "https://flag.test/");
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.store_dir, None);
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        let cli = Cli::try_parse_from(["swcache", "--origin", "ftp://x.test/", "list"]).unwrap();
        assert!(load_scope_config(&cli).is_err());
    }

    #[tokio::test]
    async fn test_timestamp_store_follows_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScopeConfig::new().with_store_dir(dir.path());
        let store = timestamp_store(&config).await.unwrap();
        assert!(store.scan_newest_first("any").await.unwrap().is_empty());
    }
}
