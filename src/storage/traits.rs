//! Ledger trait and error types
//!
//! This module defines the trait interface for ledger backends and
//! associated error types.

use crate::state::CrawlStatus;
use crate::storage::{CrawlRecord, PageResult};
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corrupt ledger row for query {query}: unknown status '{status}'")]
    UnknownStatus { query: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for ledger operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable per-query crawl status and progress
///
/// Every write is an upsert: calling either update method for a query that has
/// no record yet creates it. Records are never deleted.
pub trait Ledger {
    // ===== Writes =====

    /// Sets the status and message of a query's record
    fn update_status(
        &mut self,
        query: &str,
        status: CrawlStatus,
        message: Option<&str>,
    ) -> StorageResult<()>;

    /// Appends one page's results and bumps the running total
    ///
    /// # Arguments
    ///
    /// * `query` - The query the page belongs to
    /// * `new_items` - Identifiers processed for the first time on this page
    /// * `page_item_count` - Number of identifiers the page listed
    ///
    /// The record moves to `InProgress` unless its status is terminal.
    fn update_results(
        &mut self,
        query: &str,
        new_items: &[String],
        page_item_count: usize,
    ) -> StorageResult<()>;

    // ===== Reads =====

    /// Gets a query's record, if one was ever written
    fn get_record(&self, query: &str) -> StorageResult<Option<CrawlRecord>>;

    /// Gets every record, ordered by query
    fn list_records(&self) -> StorageResult<Vec<CrawlRecord>>;

    /// Gets the page results appended for a query, oldest first
    fn page_results(&self, query: &str) -> StorageResult<Vec<PageResult>>;
}
