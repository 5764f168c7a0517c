//! CSV dataset writer

use crate::output::traits::{DatasetWriter, OutputError, OutputResult};
use crate::output::Record;
use std::path::{Path, PathBuf};

/// Writes rows to a CSV file with a header row
///
/// The file is only created when there is at least one row to write.
pub struct CsvDatasetWriter {
    path: PathBuf,
}

impl CsvDatasetWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn csv_error(&self, source: csv::Error) -> OutputError {
        OutputError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

impl DatasetWriter for CsvDatasetWriter {
    fn write_rows(&mut self, rows: &[Record]) -> OutputResult<usize> {
        if rows.is_empty() {
            tracing::warn!("Dataset is empty, not writing {}", self.path.display());
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| OutputError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| self.csv_error(e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| self.csv_error(e))?;
        }
        writer.flush().map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!("Wrote {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }
}
