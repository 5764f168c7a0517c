//! Ledger summaries for the `--status` report
//!
//! Reads every query's record from the ledger and prints one line per query
//! plus totals per status.

use crate::state::CrawlStatus;
use crate::storage::{CrawlRecord, Ledger};
use crate::HarvestError;
use std::collections::BTreeMap;

/// Snapshot of the ledger
#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub records: Vec<CrawlRecord>,

    /// Count of records by status display name
    pub by_status: BTreeMap<String, u64>,

    /// Sum of every record's running total
    pub total_items: u64,
}

/// Loads a summary of every record in the ledger
pub fn load_ledger_summary(ledger: &dyn Ledger) -> Result<LedgerSummary, HarvestError> {
    let records = ledger.list_records()?;

    let mut by_status = BTreeMap::new();
    let mut total_items = 0;
    for record in &records {
        *by_status.entry(record.status.to_string()).or_insert(0) += 1;
        total_items += record.total_count;
    }

    Ok(LedgerSummary {
        records,
        by_status,
        total_items,
    })
}

/// Prints a summary to stdout
pub fn print_ledger_summary(summary: &LedgerSummary) {
    println!("=== Crawl Ledger ===\n");

    if summary.records.is_empty() {
        println!("No queries recorded yet.");
        return;
    }

    for record in &summary.records {
        println!("{}", record.query);
        println!(
            "  status: {}  items: {}  pages: {}  updated: {}",
            record.status, record.total_count, record.pages_recorded, record.updated_at
        );
        if let Some(message) = &record.message {
            println!("  message: {}", message);
        }
    }
    println!();

    println!("By status:");
    for (status, count) in &summary.by_status {
        println!("  {}: {}", status, count);
    }
    println!("Total items: {}", summary.total_items);
}

impl LedgerSummary {
    /// Number of records whose last run ended with errors
    pub fn errored(&self) -> u64 {
        self.by_status
            .get(&CrawlStatus::FinishedWithErrors.to_string())
            .copied()
            .unwrap_or(0)
    }
}
