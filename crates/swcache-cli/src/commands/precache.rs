use crate::output::{
    OutputFormat, OutputStyle, create_table, format_success, header_cell, print_json,
    print_section_header,
};
use anyhow::Context;
use std::path::Path;
use swcache_core::WorkerScope;
use swcache_precaching::{PrecacheController, PrecacheEntry, PrecacheOptions};

/// Build a controller for `scope` with the entries of a manifest file
pub async fn load_controller(
    scope: &WorkerScope,
    manifest: &Path,
    cache: Option<String>,
) -> anyhow::Result<PrecacheController> {
    let data = tokio::fs::read_to_string(manifest)
        .await
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    let entries = PrecacheEntry::parse_manifest(&data)
        .with_context(|| format!("parsing manifest {}", manifest.display()))?;

    let mut options = PrecacheOptions::new();
    if let Some(cache) = cache {
        options = options.with_cache_name(cache);
    }
    let controller = PrecacheController::new(scope.clone(), options);
    controller.add_to_cache_list(&entries)?;
    tracing::debug!(
        "Loaded {} manifest entries into {}",
        entries.len(),
        controller.cache_name()
    );
    Ok(controller)
}

pub async fn install(
    scope: &WorkerScope,
    manifest: &Path,
    cache: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let controller = load_controller(scope, manifest, cache).await?;
    let result = controller.install().await.context("precache install failed")?;
    if print_json(format, &result)? {
        return Ok(());
    }

    let style = OutputStyle::new();
    print_section_header(&format!("Installed {}", controller.cache_name()), &style);
    let mut table = create_table();
    table.set_header(vec![header_cell("URL", &style), header_cell("Status", &style)]);
    for url in &result.updated_urls {
        table.add_row(vec![url.as_str(), "fetched"]);
    }
    for url in &result.not_updated_urls {
        table.add_row(vec![url.as_str(), "up to date"]);
    }
    println!("{table}");
    println!(
        "{}",
        format_success(
            &format!(
                "{} fetched, {} already cached",
                result.updated_urls.len(),
                result.not_updated_urls.len()
            ),
            &style
        )
    );
    Ok(())
}

pub async fn activate(
    scope: &WorkerScope,
    manifest: &Path,
    cache: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let controller = load_controller(scope, manifest, cache).await?;
    let result = controller
        .activate()
        .await
        .context("precache activate failed")?;
    if print_json(format, &result)? {
        return Ok(());
    }

    let style = OutputStyle::new();
    print_section_header(&format!("Activated {}", controller.cache_name()), &style);
    if result.deleted_urls.is_empty() {
        println!("No outdated entries");
        return Ok(());
    }
    let mut table = create_table();
    table.set_header(vec![header_cell("Deleted", &style)]);
    for url in &result.deleted_urls {
        table.add_row(vec![url.as_str()]);
    }
    println!("{table}");
    Ok(())
}
