//! Crawler coordinator - the per-query crawl loop
//!
//! This module drives one query through a source:
//! - Pre-flight rejection through `Source::check_url`
//! - Page-by-page traversal with in-run deduplication
//! - Per-item processing with politeness delays
//! - Reporting page results and failures to the ledger
//! - Stopping cleanly between units of work when cancelled

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{persist, FetchError, FetchOutcome, Fetcher};
use crate::source::{CrawlMode, ItemOutcome, ParsedPage, Source, RESULTS_FILE};
use crate::state::{CrawlStatus, SeenSet};
use crate::storage::Ledger;
use crate::HarvestError;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Politeness delays between units of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub item_delay: Duration,
    pub page_delay: Duration,
    /// Whether the page that ends a crawl also waits `page_delay`
    pub delay_after_last_page: bool,
}

impl Pacing {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            item_delay: Duration::from_millis(config.item_delay_ms),
            page_delay: Duration::from_millis(config.page_delay_ms),
            delay_after_last_page: config.delay_after_last_page,
        }
    }

    /// No delays at all
    pub fn none() -> Self {
        Self {
            item_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            delay_after_last_page: false,
        }
    }
}

/// Why a query's crawl ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A page yielded no new items
    Exhausted,
    /// The source refused the query before any fetch
    Rejected(String),
    /// The cancellation token fired
    Cancelled,
}

/// Summary of one `crawl_query` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub query: String,
    /// Result pages requested, including the one that ended the crawl
    pub pages_fetched: u32,
    /// Identifiers processed for the first time this run
    pub items_processed: u64,
    /// Items actually downloaded (not already on disk)
    pub items_downloaded: u64,
    pub termination: Termination,
}

impl CrawlReport {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            pages_fetched: 0,
            items_processed: 0,
            items_downloaded: 0,
            termination: Termination::Exhausted,
        }
    }
}

/// What processing one result page amounted to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Identifiers processed for the first time, in page order
    pub processed: Vec<String>,
    /// Number of identifiers the page listed
    pub extracted: usize,
    /// How many of `processed` were downloaded rather than found on disk
    pub downloaded: u64,
    /// Processing stopped early because of cancellation
    pub cancelled: bool,
}

/// Runs queries of one source against one ledger
pub struct Coordinator<'a> {
    source: &'a dyn Source,
    fetcher: &'a Fetcher,
    ledger: &'a mut dyn Ledger,
    pacing: Pacing,
    cancel: CancellationToken,
}

impl<'a> Coordinator<'a> {
    /// Creates a coordinator
    ///
    /// # Arguments
    ///
    /// * `source` - The source strategy queries are crawled with
    /// * `fetcher` - Shared fetcher (and its cookie jar)
    /// * `ledger` - Where progress and failures are recorded
    /// * `pacing` - Delays between items and pages
    /// * `cancel` - Checked at every page and item boundary
    pub fn new(
        source: &'a dyn Source,
        fetcher: &'a Fetcher,
        ledger: &'a mut dyn Ledger,
        pacing: Pacing,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            fetcher,
            ledger,
            pacing,
            cancel,
        }
    }

    /// Crawls one query into `folder`
    ///
    /// Fetch failures are recorded to the ledger and never abort the crawl;
    /// only ledger and filesystem errors are returned.
    pub async fn crawl_query(
        &mut self,
        query: &str,
        folder: &Path,
        start_page: Option<u32>,
    ) -> Result<CrawlReport, HarvestError> {
        std::fs::create_dir_all(folder).map_err(|e| HarvestError::io(folder, e))?;

        if let Some(reason) = self.source.check_url(query).filter(|r| !r.is_empty()) {
            tracing::warn!("{}: rejected query '{}': {}", self.source.name(), query, reason);
            self.ledger
                .update_status(query, CrawlStatus::FinishedWithErrors, Some(&reason))?;
            let mut report = CrawlReport::new(query);
            report.termination = Termination::Rejected(reason);
            return Ok(report);
        }

        match self.source.crawl_mode() {
            CrawlMode::Paginated => self.crawl_paginated(query, folder, start_page).await,
            CrawlMode::SingleRequest => self.crawl_single_request(query, folder).await,
        }
    }

    async fn crawl_paginated(
        &mut self,
        query: &str,
        folder: &Path,
        start_page: Option<u32>,
    ) -> Result<CrawlReport, HarvestError> {
        let mut report = CrawlReport::new(query);
        let mut seen = SeenSet::new();
        let mut page = start_page.unwrap_or(1).max(1);

        loop {
            if self.cancel.is_cancelled() {
                report.termination = Termination::Cancelled;
                break;
            }

            tracing::info!("{}: '{}' page {}", self.source.name(), query, page);
            let outcome = self.process_page(page, query, folder, &mut seen).await?;
            report.pages_fetched += 1;
            report.items_processed += outcome.processed.len() as u64;
            report.items_downloaded += outcome.downloaded;

            let exhausted = outcome.processed.is_empty();
            if !exhausted {
                self.ledger
                    .update_results(query, &outcome.processed, outcome.extracted)?;
            }

            if outcome.cancelled {
                report.termination = Termination::Cancelled;
                break;
            }

            let wait = !exhausted || self.pacing.delay_after_last_page;
            if wait && !self.pause(self.pacing.page_delay).await && !exhausted {
                report.termination = Termination::Cancelled;
                break;
            }

            if exhausted {
                tracing::info!(
                    "{}: '{}' finished after {} pages ({} new items)",
                    self.source.name(),
                    query,
                    report.pages_fetched,
                    report.items_processed
                );
                report.termination = Termination::Exhausted;
                break;
            }

            page += 1;
        }

        Ok(report)
    }

    /// Fetches result page `page`, then processes every identifier not yet seen
    pub async fn process_page(
        &mut self,
        page: u32,
        query: &str,
        folder: &Path,
        seen: &mut SeenSet,
    ) -> Result<PageOutcome, HarvestError> {
        let url = self.source.prepare_query(query, page);
        let parsed = match self.fetcher.fetch(&url, None).await {
            Ok(FetchOutcome::Bytes(bytes)) => ParsedPage::from_bytes(&bytes),
            Ok(FetchOutcome::Skipped) => ParsedPage::Empty,
            Err(e) => {
                self.record_failure(query, &e)?;
                ParsedPage::Empty
            }
        };

        let links = self.source.extract_links(&parsed);
        let mut outcome = PageOutcome {
            extracted: links.len(),
            ..PageOutcome::default()
        };

        for id in links {
            if seen.contains(&id) {
                continue;
            }
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            match self.source.process_article(self.fetcher, &id, folder).await {
                Ok(ItemOutcome::Stored) => outcome.downloaded += 1,
                Ok(ItemOutcome::AlreadyStored) => {}
                Err(e) => self.record_failure(query, &e)?,
            }

            seen.insert(id.clone());
            outcome.processed.push(id);

            if !self.pause(self.pacing.item_delay).await {
                outcome.cancelled = true;
                break;
            }
        }

        Ok(outcome)
    }

    /// One JSON request for the whole result set, kept as `RESULTS_FILE`
    async fn crawl_single_request(
        &mut self,
        query: &str,
        folder: &Path,
    ) -> Result<CrawlReport, HarvestError> {
        let mut report = CrawlReport::new(query);
        if self.cancel.is_cancelled() {
            report.termination = Termination::Cancelled;
            return Ok(report);
        }

        let url = self.source.prepare_query(query, 1);
        report.pages_fetched = 1;

        let value = match self.fetcher.fetch_json(&url).await {
            Ok(value) => value,
            Err(e) => {
                self.record_failure(query, &e)?;
                return Ok(report);
            }
        };

        if let Some(reason) = self.source.check_response(&value) {
            self.record_problem(query, &url, &reason)?;
            return Ok(report);
        }

        let path = folder.join(RESULTS_FILE);
        let body = serde_json::to_vec_pretty(&value).map_err(|source| HarvestError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        persist(&path, &body).map_err(|e| HarvestError::io(&path, e))?;

        let ids = self.source.extract_links(&ParsedPage::Json(value));
        tracing::info!("{}: '{}' returned {} records", self.source.name(), query, ids.len());

        report.items_processed = ids.len() as u64;
        report.items_downloaded = ids.len() as u64;
        self.ledger.update_results(query, &ids, ids.len())?;

        Ok(report)
    }

    /// Records a failed fetch against the query
    fn record_failure(&mut self, query: &str, error: &FetchError) -> Result<(), HarvestError> {
        let url = error.url().unwrap_or(query);
        self.record_problem(query, url, &error.to_string())
    }

    fn record_problem(&mut self, query: &str, url: &str, reason: &str) -> Result<(), HarvestError> {
        let message = format!("The problem with url {}: {}", url, reason);
        tracing::warn!("{}", message);
        self.ledger
            .update_status(query, CrawlStatus::FinishedWithErrors, Some(&message))?;
        Ok(())
    }

    /// Sleeps for `delay`; returns false if cancelled first
    async fn pause(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
