//! Barcache CLI — load and inspect the historical bar cache.
//!
//! Commands:
//! - `load` — download missing (instrument, year) files and load the feed
//! - `status` — report which cache files exist, without network access

use anyhow::{Context, Result};
use barcache_core::data::{build_feed, CsvCache, TracingObserver};
use barcache_core::{BarFeed, LoaderConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barcache",
    about = "Barcache CLI — cached historical daily bars"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download missing cache files and load every file into a bar feed.
    Load {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Keep going when a download fails (overrides the config).
        #[arg(long, default_value_t = false)]
        skip_errors: bool,

        /// Cache directory (overrides the config).
        #[arg(long)]
        storage: Option<PathBuf>,
    },
    /// Report which cache files exist and which are missing.
    Status {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Cache directory (overrides the config).
        #[arg(long)]
        storage: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            config,
            skip_errors,
            storage,
        } => run_load(config, skip_errors, storage),
        Commands::Status { config, storage } => run_status(config, storage),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path, storage: Option<PathBuf>) -> Result<LoaderConfig> {
    let mut config = LoaderConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if let Some(storage) = storage {
        config.feed.storage = storage;
    }
    Ok(config)
}

fn run_load(config_path: PathBuf, skip_errors: bool, storage: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_path, storage)?;
    let mut opts = config.feed_options();
    if skip_errors {
        opts.skip_errors = true;
    }

    let source = config
        .source
        .build()
        .context("building history source")?;

    let feed = build_feed(source.as_ref(), &opts, &TracingObserver)?;
    tracing::info!(
        instruments = opts.instruments.len(),
        bars = feed.len(),
        "feed loaded"
    );
    print_summary(&feed);

    if opts.skip_errors {
        let cache = CsvCache::new(&opts.storage, source.tag());
        let missing = cache.missing(opts.instruments.as_slice(), opts.from_year..=opts.to_year);
        if !missing.is_empty() {
            println!("\nMissing after load ({}):", missing.len());
            for entry in &missing {
                println!("  {} {}", entry.instrument, entry.year);
            }
        }
    }

    Ok(())
}

fn run_status(config_path: PathBuf, storage: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_path, storage)?;
    let feed = &config.feed;
    let cache = CsvCache::new(&feed.storage, config.source.tag());

    println!("Cache directory: {}", cache.dir().display());
    let status = cache.status(feed.instruments.as_slice(), feed.from_year..=feed.to_year);
    let cached = status.iter().filter(|e| e.cached).count();
    for entry in &status {
        let mark = if entry.cached { "cached " } else { "missing" };
        println!("  {mark}  {:<10} {}  {}", entry.instrument, entry.year, entry.path.display());
    }
    println!("\n{cached}/{} files cached", status.len());

    Ok(())
}

fn print_summary(feed: &BarFeed) {
    println!("\n{:<10} {:>6}  {:<10}  {:<10}", "Instrument", "Bars", "First", "Last");
    println!("{}", "-".repeat(42));
    for instrument in feed.instruments() {
        let count = feed.bars(instrument).map_or(0, |b| b.len());
        match feed.date_range(instrument) {
            Some((first, last)) => {
                println!("{instrument:<10} {count:>6}  {first:<10}  {last:<10}")
            }
            None => println!("{instrument:<10} {count:>6}"),
        }
    }
    println!("\nTotal bars:  {}", feed.len());
    println!("Fingerprint: {}", feed.fingerprint());
}
