use crate::output::{
    OutputFormat, OutputStyle, create_table, header_cell, numeric_cell, print_json,
    print_section_header,
};
use serde::Serialize;
use std::sync::Arc;
use swcache_core::{CacheStorage, MatchOptions, WorkerScope};
use swcache_expiration::{CacheExpiration, ExpirationConfig, TimestampStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpireReport {
    pub cache_name: String,
    pub entries_before: usize,
    pub entries_after: usize,
}

async fn entry_count(caches: &Arc<dyn CacheStorage>, cache_name: &str) -> anyhow::Result<usize> {
    Ok(caches
        .open(cache_name)
        .await?
        .keys(None, &MatchOptions::default())
        .await?
        .len())
}

/// Run one expiration pass and report how many entries it removed
pub async fn run_pass(
    scope: &WorkerScope,
    store: Arc<dyn TimestampStore>,
    cache_name: &str,
    config: ExpirationConfig,
) -> anyhow::Result<ExpireReport> {
    config.validate().map_err(anyhow::Error::msg)?;
    let caches = Arc::clone(scope.caches());
    if !caches.has(cache_name).await? {
        anyhow::bail!("no cache named {cache_name}");
    }

    let entries_before = entry_count(&caches, cache_name).await?;
    let expiration = Arc::new(CacheExpiration::new(
        cache_name,
        config,
        Arc::clone(&caches),
        store,
    ));
    expiration.expire_entries().await?;
    let entries_after = entry_count(&caches, cache_name).await?;

    Ok(ExpireReport {
        cache_name: cache_name.to_string(),
        entries_before,
        entries_after,
    })
}

pub async fn handle(
    scope: &WorkerScope,
    store: Arc<dyn TimestampStore>,
    cache_name: &str,
    max_entries: Option<usize>,
    max_age_seconds: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut config = ExpirationConfig::new();
    if let Some(max_entries) = max_entries {
        config = config.with_max_entries(max_entries);
    }
    if let Some(seconds) = max_age_seconds {
        config = config.with_max_age_seconds(seconds);
    }

    let report = run_pass(scope, store, cache_name, config).await?;
    if print_json(format, &report)? {
        return Ok(());
    }

    let style = OutputStyle::new();
    print_section_header(&format!("Expired {}", report.cache_name), &style);
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Before", &style),
        header_cell("After", &style),
        header_cell("Removed", &style),
    ]);
    table.add_row(vec![
        numeric_cell(report.entries_before),
        numeric_cell(report.entries_after),
        numeric_cell(report.entries_before.saturating_sub(report.entries_after)),
    ]);
    println!("{table}");
    Ok(())
}
