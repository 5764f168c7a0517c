//! Storage module for the crawl ledger
//!
//! This module persists per-query crawl progress:
//! - SQLite database initialization and schema management
//! - Status/message upserts keyed by query
//! - Per-page result counts and running totals
//! - Read access for status reports

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteLedger;
pub use traits::{Ledger, StorageError, StorageResult};

use crate::state::CrawlStatus;
use crate::HarvestError;
use std::path::Path;

/// Initializes or opens a ledger database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteLedger)` - Successfully opened ledger
/// * `Err(HarvestError)` - Failed to open the database
pub fn open_ledger(path: &Path) -> Result<SqliteLedger, HarvestError> {
    Ok(SqliteLedger::new(path)?)
}

/// A query's ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRecord {
    pub query: String,
    pub status: CrawlStatus,
    pub message: Option<String>,
    /// Running total of new items reported across all pages
    pub total_count: u64,
    /// Number of result pages reported
    pub pages_recorded: u64,
    pub started_at: String,
    pub updated_at: String,
}

/// One `update_results` call as stored in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub query: String,
    /// Identifiers processed for the first time on this page
    pub new_items: u64,
    /// Identifiers the page listed, duplicates included
    pub page_items: u64,
    pub recorded_at: String,
}
