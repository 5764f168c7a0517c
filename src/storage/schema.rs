//! Database schema definitions
//!
//! This module contains the SQL schema for the ledger database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One record per query
CREATE TABLE IF NOT EXISTS crawl_records (
    query TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    message TEXT,
    total_count INTEGER NOT NULL DEFAULT 0,
    pages_recorded INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per reported result page
CREATE TABLE IF NOT EXISTS crawl_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL REFERENCES crawl_records(query),
    new_items INTEGER NOT NULL,
    page_items INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_pages_query ON crawl_pages(query);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
