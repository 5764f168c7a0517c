//! Scholar-Harvest main entry point
//!
//! This is the command-line interface for the Scholar-Harvest crawler.

use anyhow::Context;
use clap::Parser;
use scholar_harvest::config::{load_config_with_hash, Config};
use scholar_harvest::crawler::{crawl, Termination};
use scholar_harvest::output::{export_dataset, load_ledger_summary, print_ledger_summary};
use scholar_harvest::source::build_source;
use scholar_harvest::storage::open_ledger;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Scholar-Harvest: a polite, resumable bibliographic crawler
///
/// Crawls the configured queries page by page, storing every result item
/// on disk and recording per-query progress in a ledger. Interrupted crawls
/// pick up where they left off without downloading anything twice.
#[derive(Parser, Debug)]
#[command(name = "scholar-harvest")]
#[command(version)]
#[command(about = "A polite, resumable bibliographic crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the first request of every query without crawling
    #[arg(long, conflicts_with_all = ["status", "export_dataset"])]
    dry_run: bool,

    /// Show the ledger and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_dataset"])]
    status: bool,

    /// Assemble the dataset from stored items and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    export_dataset: bool,

    /// First result page for every query, overriding the config
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    start_page: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.start_page)
    } else if cli.status {
        handle_status(&config)
    } else if cli.export_dataset {
        handle_export_dataset(&config)
    } else {
        handle_crawl(config, cli.start_page).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scholar_harvest=info,warn"),
            1 => EnvFilter::new("scholar_harvest=debug,info"),
            2 => EnvFilter::new("scholar_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be requested
fn handle_dry_run(config: &Config, start_page: Option<u32>) -> anyhow::Result<()> {
    println!("=== Scholar-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Backoff unit: {}ms", config.crawler.backoff_unit_ms);
    println!("  Item delay: {}ms", config.crawler.item_delay_ms);
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Ledger: {}", config.output.ledger_path);
    println!("  Dataset: {}", config.output.dataset_path);
    println!("  Data directory: {}", config.output.data_dir);

    println!("\nQueries ({}):", config.queries.len());
    for entry in &config.queries {
        let source_entry = config
            .source(&entry.source)
            .with_context(|| format!("Unknown source '{}'", entry.source))?;
        let source = build_source(source_entry)?;
        let page = start_page
            .or(entry.start_page)
            .unwrap_or(config.crawler.start_page);

        println!("  - [{}] {}", source.name(), entry.query);
        println!("    folder: {}", config.query_folder(entry).display());
        match source.check_url(&entry.query).filter(|r| !r.is_empty()) {
            Some(reason) => println!("    rejected: {}", reason),
            None => println!("    first request: {}", source.prepare_query(&entry.query, page)),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --status mode: shows every query in the ledger
fn handle_status(config: &Config) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.output.ledger_path);

    let ledger = open_ledger(Path::new(&config.output.ledger_path))?;
    let summary = load_ledger_summary(&ledger)?;
    print_ledger_summary(&summary);

    Ok(())
}

/// Handles the --export-dataset mode: one CSV from every query folder
fn handle_export_dataset(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Dataset ===\n");

    let written = export_dataset(config).context("Failed to export dataset")?;
    if written > 0 {
        println!(
            "✓ {} rows exported to: {}",
            written,
            Path::new(&config.output.dataset_path).display()
        );
    } else {
        println!("Nothing to export");
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, start_page: Option<u32>) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} queries across {} sources",
        config.queries.len(),
        config.sources.len()
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current item");
            on_interrupt.cancel();
        }
    });

    let reports = crawl(config, start_page, cancel).await.map_err(|e| {
        tracing::error!("Crawl failed: {}", e);
        e
    })?;

    let cancelled = reports
        .iter()
        .any(|report| report.termination == Termination::Cancelled);
    let downloaded: u64 = reports.iter().map(|report| report.items_downloaded).sum();

    if cancelled {
        tracing::info!("Crawl stopped early; rerun to resume ({} items downloaded)", downloaded);
    } else {
        tracing::info!("Crawl completed ({} items downloaded)", downloaded);
    }

    Ok(())
}
