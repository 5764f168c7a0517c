//! Output module for turning stored items into a dataset
//!
//! This module handles:
//! - Normalizing stored items into [`Record`] rows through their source
//! - Year extraction and fallback rules
//! - Writing the dataset as CSV
//! - Summarizing the ledger for status reports

mod csv_writer;
mod record;
pub mod stats;
mod traits;

pub use csv_writer::CsvDatasetWriter;
pub use record::{append_joined, extract_year, fill_year_if_not_found, is_valid_year, Record};
pub use stats::{load_ledger_summary, print_ledger_summary, LedgerSummary};
pub use traits::{DatasetWriter, OutputError, OutputResult};

use crate::config::Config;
use crate::source::{build_source, Source};
use crate::HarvestError;
use std::path::Path;

/// Builds the dataset for one query folder
///
/// Every stored item becomes one row. A row whose fields cannot be mapped is
/// kept with whatever was filled before the failure, and its year is left
/// alone; every other row gets a year, falling back to `fallback_year`.
///
/// # Arguments
///
/// * `source` - The source the folder was crawled with
/// * `folder` - The query folder holding the stored items
/// * `fallback_year` - Year used when no plausible year can be found
pub fn assemble_dataset(
    source: &dyn Source,
    folder: &Path,
    fallback_year: i32,
) -> Result<Vec<Record>, HarvestError> {
    let natives = source.load_native_records(folder)?;
    let mut rows = Vec::with_capacity(natives.len());

    for native in &natives {
        let mut row = Record::default();
        match source.fill_fields(native, &mut row) {
            Ok(()) => fill_year_if_not_found(&mut row, fallback_year),
            Err(e) => tracing::warn!("{}: could not map {}: {}", source.name(), native.name(), e),
        }
        rows.push(row);
    }

    tracing::debug!(
        "Assembled {} rows from {} for {}",
        rows.len(),
        folder.display(),
        source.name()
    );

    Ok(source.process_whole_dataset(rows))
}

/// Assembles every configured query folder and writes the dataset CSV
///
/// Queries that have not been crawled yet are skipped. Returns the number of
/// rows written.
pub fn export_dataset(config: &Config) -> Result<usize, HarvestError> {
    let mut rows = Vec::new();
    for entry in &config.queries {
        let source_entry = config
            .source(&entry.source)
            .ok_or_else(|| HarvestError::UnknownSource(entry.source.clone()))?;
        let source = build_source(source_entry)?;
        let folder = config.query_folder(entry);

        if !folder.exists() {
            tracing::warn!("No data for '{}' yet ({})", entry.query, folder.display());
            continue;
        }

        let assembled = assemble_dataset(source.as_ref(), &folder, config.output.fallback_year)?;
        tracing::info!("{} rows from '{}'", assembled.len(), entry.query);
        rows.extend(assembled);
    }

    let path = Path::new(&config.output.dataset_path);
    Ok(CsvDatasetWriter::new(path).write_rows(&rows)?)
}
