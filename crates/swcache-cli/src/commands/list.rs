use crate::output::{
    OutputFormat, OutputStyle, create_table, format_warning, header_cell, numeric_cell,
    print_json, print_section_header,
};
use comfy_table::Cell;
use serde::Serialize;
use swcache_core::{MatchOptions, Response, WorkerScope};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub name: String,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub url: String,
    pub status: Option<u16>,
    pub bytes: Option<usize>,
}

pub async fn list_caches(scope: &WorkerScope) -> anyhow::Result<Vec<CacheSummary>> {
    let caches = scope.caches();
    let mut summaries = Vec::new();
    for name in caches.keys().await? {
        let entries = caches
            .open(&name)
            .await?
            .keys(None, &MatchOptions::default())
            .await?
            .len();
        summaries.push(CacheSummary { name, entries });
    }
    Ok(summaries)
}

pub async fn list_entries(
    scope: &WorkerScope,
    cache_name: &str,
) -> anyhow::Result<Vec<EntrySummary>> {
    let caches = scope.caches();
    if !caches.has(cache_name).await? {
        anyhow::bail!("no cache named {cache_name}");
    }

    let cache = caches.open(cache_name).await?;
    let options = MatchOptions::default();
    let mut entries = Vec::new();
    for request in cache.keys(None, &options).await? {
        let response = cache.match_request(&request, &options).await?;
        entries.push(EntrySummary {
            url: request.url().to_string(),
            status: response.as_ref().map(Response::status),
            bytes: response.as_ref().map(|r| r.body().len()),
        });
    }
    Ok(entries)
}

pub async fn handle(
    scope: &WorkerScope,
    cache: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let style = OutputStyle::new();

    let Some(cache_name) = cache else {
        let summaries = list_caches(scope).await?;
        if print_json(format, &summaries)? {
            return Ok(());
        }
        print_section_header("Caches", &style);
        if summaries.is_empty() {
            println!("{}", format_warning("No caches", &style));
            return Ok(());
        }
        let mut table = create_table();
        table.set_header(vec![
            header_cell("Name", &style),
            header_cell("Entries", &style),
        ]);
        for summary in &summaries {
            table.add_row(vec![
                Cell::new(&summary.name),
                numeric_cell(summary.entries),
            ]);
        }
        println!("{table}");
        return Ok(());
    };

    let entries = list_entries(scope, &cache_name).await?;
    if print_json(format, &entries)? {
        return Ok(());
    }
    print_section_header(&cache_name, &style);
    let mut table = create_table();
    table.set_header(vec![
        header_cell("URL", &style),
        header_cell("Status", &style),
        header_cell("Bytes", &style),
    ]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(&entry.url),
            numeric_cell(entry.status.map_or_else(|| "-".to_string(), |s| s.to_string())),
            numeric_cell(entry.bytes.map_or_else(|| "-".to_string(), |b| b.to_string())),
        ]);
    }
    println!("{table}");
    Ok(())
}
