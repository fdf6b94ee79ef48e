//! swcache command-line interface
//!
//! Drives the precache lifecycle, runtime expiration and cached fetches
//! against a disk-backed cache store, so the same store can be inspected and
//! maintained between runs.

pub mod commands;
pub mod config;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

pub use crate::config::{load_scope_config, timestamp_store};
pub use crate::output::{OutputFormat, OutputStyle};

#[derive(Parser, Debug)]
#[command(
    name = "swcache",
    about = "Offline cache maintenance: precache manifests, expire runtime caches, fetch through a cache",
    version
)]
pub struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, global = true, default_value = "info")]
    pub log_level: LogLevel,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true, env = "SWCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Origin relative URLs resolve against
    #[arg(long, global = true, env = "SWCACHE_ORIGIN")]
    pub origin: Option<String>,

    /// Directory of the persistent cache store
    #[arg(long, global = true, env = "SWCACHE_STORE")]
    pub store: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a manifest and fetch its entries into the precache
    Install {
        /// JSON manifest file
        #[arg(short, long)]
        manifest: PathBuf,

        /// Precache name
        #[arg(long)]
        cache: Option<String>,
    },

    /// Register a manifest and delete precached entries it no longer names
    Activate {
        /// JSON manifest file
        #[arg(short, long)]
        manifest: PathBuf,

        /// Precache name
        #[arg(long)]
        cache: Option<String>,
    },

    /// Run one expiration pass over a runtime cache
    Expire {
        /// Runtime cache name
        #[arg(long)]
        cache: String,

        /// Keep at most this many entries
        #[arg(long)]
        max_entries: Option<usize>,

        /// Remove entries unused for longer than this
        #[arg(long)]
        max_age_seconds: Option<u64>,
    },

    /// Fetch a URL through a stale-while-revalidate cache
    Fetch {
        /// URL, absolute or relative to the origin
        url: String,

        /// Runtime cache name
        #[arg(long)]
        cache: Option<String>,

        /// Track the entry for expiration, keeping at most this many;
        /// needs a custom `--cache`
        #[arg(long, requires = "cache")]
        max_entries: Option<usize>,
    },

    /// List cache names, or the entries of one cache
    List {
        /// Cache to list
        #[arg(long)]
        cache: Option<String>,
    },
}

/// Build the scope described by `cli` and run its command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_scope_config(&cli)?;
    let scope = swcache_core::WorkerScope::from_config(&config).await?;
    let format = cli.format;

    match cli.command {
        Commands::Install { manifest, cache } => {
            commands::precache::install(&scope, &manifest, cache, format).await
        }
        Commands::Activate { manifest, cache } => {
            commands::precache::activate(&scope, &manifest, cache, format).await
        }
        Commands::Expire {
            cache,
            max_entries,
            max_age_seconds,
        } => {
            let store = timestamp_store(&config).await?;
            commands::expire::handle(&scope, store, &cache, max_entries, max_age_seconds, format)
                .await
        }
        Commands::Fetch {
            url,
            cache,
            max_entries,
        } => {
            let store = timestamp_store(&config).await?;
            commands::fetch::handle(&scope, store, &url, cache, max_entries, format).await
        }
        Commands::List { cache } => commands::list::handle(&scope, cache, format).await,
    }
}
