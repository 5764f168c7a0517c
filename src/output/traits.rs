//! Dataset writer trait and error types

use crate::output::Record;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing a dataset
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write CSV to {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for an assembled dataset
pub trait DatasetWriter {
    /// Writes every row, replacing whatever the destination held
    ///
    /// Returns the number of rows written.
    fn write_rows(&mut self, rows: &[Record]) -> OutputResult<usize>;
}
