/// Crawl status definitions for tracking per-query progress
///
/// This module defines the states a query's ledger record can be in.
use std::fmt;

/// Represents the current status of a query in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Pages are still being harvested (or the last run stopped mid-way)
    InProgress,

    // ===== Terminal States =====
    /// The crawl ran to completion
    Finished,

    /// The crawl was rejected or hit at least one fetch failure
    FinishedWithErrors,
}

impl CrawlStatus {
    /// Returns true if this is a terminal status
    ///
    /// Result updates never move a record out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::FinishedWithErrors)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::FinishedWithErrors => "finished_with_errors",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            "finished_with_errors" => Some(Self::FinishedWithErrors),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InProgress => "In progress",
            Self::Finished => "Finished",
            Self::FinishedWithErrors => "Finished with errors",
        };
        write!(f, "{}", label)
    }
}
