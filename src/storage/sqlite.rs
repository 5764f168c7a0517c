//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait.

use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, StorageError, StorageResult};
use crate::storage::{CrawlRecord, PageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RECORD_COLUMNS: &str =
    "query, status, message, total_count, pages_recorded, started_at, updated_at";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens (or creates) a ledger database file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger, discarded when dropped
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// A record row with its status still in database form
struct RawRecord {
    query: String,
    status: String,
    message: Option<String>,
    total_count: i64,
    pages_recorded: i64,
    started_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            query: row.get(0)?,
            status: row.get(1)?,
            message: row.get(2)?,
            total_count: row.get(3)?,
            pages_recorded: row.get(4)?,
            started_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> StorageResult<CrawlRecord> {
        let status = CrawlStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::UnknownStatus {
                query: self.query.clone(),
                status: self.status.clone(),
            }
        })?;

        Ok(CrawlRecord {
            query: self.query,
            status,
            message: self.message,
            total_count: self.total_count as u64,
            pages_recorded: self.pages_recorded as u64,
            started_at: self.started_at,
            updated_at: self.updated_at,
        })
    }
}

impl Ledger for SqliteLedger {
    // ===== Writes =====

    fn update_status(
        &mut self,
        query: &str,
        status: CrawlStatus,
        message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_records (query, status, message, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(query) DO UPDATE SET
                status = excluded.status,
                message = excluded.message,
                updated_at = excluded.updated_at",
            params![query, status.to_db_string(), message, now],
        )?;
        Ok(())
    }

    fn update_results(
        &mut self,
        query: &str,
        new_items: &[String],
        page_item_count: usize,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO crawl_records (query, status, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![query, CrawlStatus::InProgress.to_db_string(), now],
        )?;

        let current: String = tx.query_row(
            "SELECT status FROM crawl_records WHERE query = ?1",
            params![query],
            |row| row.get(0),
        )?;
        let status = match CrawlStatus::from_db_string(&current) {
            Some(status) if status.is_terminal() => status,
            Some(_) => CrawlStatus::InProgress,
            None => {
                return Err(StorageError::UnknownStatus {
                    query: query.to_string(),
                    status: current,
                })
            }
        };

        tx.execute(
            "UPDATE crawl_records SET
                total_count = total_count + ?1,
                pages_recorded = pages_recorded + 1,
                updated_at = ?2,
                status = ?3
             WHERE query = ?4",
            params![new_items.len() as i64, now, status.to_db_string(), query],
        )?;

        tx.execute(
            "INSERT INTO crawl_pages (query, new_items, page_items, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![query, new_items.len() as i64, page_item_count as i64, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ===== Reads =====

    fn get_record(&self, query: &str) -> StorageResult<Option<CrawlRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_records WHERE query = ?1", RECORD_COLUMNS),
                params![query],
                RawRecord::from_row,
            )
            .optional()?;

        raw.map(RawRecord::into_record).transpose()
    }

    fn list_records(&self) -> StorageResult<Vec<CrawlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_records ORDER BY query",
            RECORD_COLUMNS
        ))?;

        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawRecord::into_record).collect()
    }

    fn page_results(&self, query: &str) -> StorageResult<Vec<PageResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT query, new_items, page_items, recorded_at
             FROM crawl_pages WHERE query = ?1 ORDER BY id",
        )?;

        let pages = stmt
            .query_map(params![query], |row| {
                Ok(PageResult {
                    query: row.get(0)?,
                    new_items: row.get::<_, i64>(1)? as u64,
                    page_items: row.get::<_, i64>(2)? as u64,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }
}
