//! Crawler module for harvesting query results
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with skip-if-exists and rate-limit backoff
//! - The per-query pagination and deduplication loop
//! - Driving every configured query in order

mod coordinator;
mod fetcher;

pub use coordinator::{Coordinator, CrawlReport, PageOutcome, Pacing, Termination};
pub use fetcher::{
    backoff_delay, build_header_map, build_http_client, FetchError, FetchOptions, FetchOutcome,
    Fetcher,
};

use crate::config::Config;
use crate::source::build_source;
use crate::storage::open_ledger;
use crate::HarvestError;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Crawls every configured query, one after another
///
/// All queries share one fetcher (and so one cookie jar) and one ledger. A
/// query that fails with a ledger or filesystem error is logged and the next
/// query still runs.
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `start_page` - Overrides every query's first result page
/// * `cancel` - Stops the crawl between units of work
///
/// # Returns
///
/// * `Ok(Vec<CrawlReport>)` - One report per query that ran to an end
/// * `Err(HarvestError)` - The ledger or HTTP client could not be set up
pub async fn crawl(
    config: Config,
    start_page: Option<u32>,
    cancel: CancellationToken,
) -> Result<Vec<CrawlReport>, HarvestError> {
    let mut ledger = open_ledger(Path::new(&config.output.ledger_path))?;
    let fetcher = Fetcher::new(&config.user_agent, FetchOptions::from_config(&config)?)?;
    let pacing = Pacing::from_config(&config.crawler);

    let mut reports = Vec::with_capacity(config.queries.len());

    for (index, entry) in config.queries.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(
                "Crawl cancelled, {} queries not started",
                config.queries.len() - index
            );
            break;
        }

        let source = match config
            .source(&entry.source)
            .ok_or_else(|| HarvestError::UnknownSource(entry.source.clone()))
            .and_then(build_source)
        {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Skipping query '{}': {}", entry.query, e);
                continue;
            }
        };

        let folder = config.query_folder(entry);
        let first_page = start_page
            .or(entry.start_page)
            .unwrap_or(config.crawler.start_page);

        let mut coordinator = Coordinator::new(
            source.as_ref(),
            &fetcher,
            &mut ledger,
            pacing,
            cancel.clone(),
        );

        match coordinator
            .crawl_query(&entry.query, &folder, Some(first_page))
            .await
        {
            Ok(report) => {
                tracing::info!(
                    "'{}': {} pages, {} new items, {} downloaded ({:?})",
                    report.query,
                    report.pages_fetched,
                    report.items_processed,
                    report.items_downloaded,
                    report.termination
                );
                reports.push(report);
            }
            Err(e) => tracing::error!("Query '{}' failed: {}", entry.query, e),
        }
    }

    Ok(reports)
}
