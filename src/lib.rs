//! Scholar-Harvest: a polite, resumable bibliographic crawler
//!
//! This crate harvests article and report metadata from document repositories,
//! page by page, persisting every item to disk and tracking per-query progress in
//! a ledger so an interrupted crawl can be restarted without re-downloading
//! anything. Harvested items are later normalized into a tabular dataset.

pub mod config;
pub mod crawler;
pub mod output;
pub mod source;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Scholar-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Could not decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    #[error("Invalid source definition for '{name}': {message}")]
    InvalidSource { name: String, message: String },
}

impl HarvestError {
    /// Wraps an IO error together with the path it happened on
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Scholar-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport, Fetcher, Termination};
pub use output::{extract_year, Record};
pub use source::Source;
pub use state::{CrawlStatus, SeenSet};
pub use storage::{Ledger, SqliteLedger};
