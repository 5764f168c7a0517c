//! Source strategies: the per-repository half of a crawl
//!
//! A source knows how to turn a query into request URLs, which identifiers a
//! result page lists, how to store an item, and how to map a stored item onto
//! the normalized [`Record`] columns. The crawl loop itself lives in
//! [`crate::crawler::Coordinator`] and is the same for every source.

mod citation;
mod usaid;

pub use citation::CitationMetaSource;
pub use usaid::{UsaidSource, RESULTS_FILE};

use crate::config::{SourceEntry, SourceKind};
use crate::crawler::{FetchError, FetchOutcome, Fetcher};
use crate::output::Record;
use crate::HarvestError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while mapping one native record onto a [`Record`]
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' has an unexpected shape: {message}")]
    Malformed { field: String, message: String },

    #[error("document carries no bibliographic metadata")]
    NoMetadata,
}

/// How a source walks through a query's results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Page-by-page traversal until a page yields nothing new
    Paginated,
    /// One JSON request returns the whole result set
    SingleRequest,
}

/// A fetched result page, as handed to [`Source::extract_links`]
#[derive(Debug, Clone)]
pub enum ParsedPage {
    Markup(String),
    Json(serde_json::Value),
    /// The fetch failed or returned nothing
    Empty,
}

impl ParsedPage {
    /// Wraps a response body as markup, decoding lossily
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Markup(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// What storing an item amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was downloaded and written
    Stored,
    /// The item's file was already on disk
    AlreadyStored,
}

/// One stored item, before field mapping
#[derive(Debug, Clone)]
pub enum NativeRecord {
    Document { name: String, body: String },
    Json { name: String, value: serde_json::Value },
}

impl NativeRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Document { name, .. } | Self::Json { name, .. } => name,
        }
    }
}

/// Capabilities a repository must supply to be crawled
#[async_trait]
pub trait Source: Send + Sync {
    /// Name used in logs and the `source_name` column
    fn name(&self) -> &str;

    fn crawl_mode(&self) -> CrawlMode {
        CrawlMode::Paginated
    }

    /// Pre-flight check; `Some(reason)` rejects the query before any fetch
    fn check_url(&self, _query: &str) -> Option<String> {
        None
    }

    /// Request URL for result page `page` (1-based) of `query`
    fn prepare_query(&self, query: &str, page: u32) -> String;

    /// Item identifiers listed on a result page, in page order
    fn extract_links(&self, page: &ParsedPage) -> Vec<String>;

    /// Checks a single-request response before it is stored; `Some(reason)`
    /// marks the query as failed
    fn check_response(&self, _response: &serde_json::Value) -> Option<String> {
        None
    }

    /// Fetches and stores one item under `folder`
    async fn process_article(
        &self,
        fetcher: &Fetcher,
        id: &str,
        folder: &Path,
    ) -> Result<ItemOutcome, FetchError> {
        let destination = item_path(folder, id);
        match fetcher.fetch(id, Some(&destination)).await? {
            FetchOutcome::Skipped => Ok(ItemOutcome::AlreadyStored),
            FetchOutcome::Bytes(_) => Ok(ItemOutcome::Stored),
        }
    }

    /// Reads every stored item of a query folder
    fn load_native_records(&self, folder: &Path) -> Result<Vec<NativeRecord>, HarvestError> {
        load_item_files(folder)
    }

    /// Maps one native record onto the normalized columns
    fn fill_fields(&self, native: &NativeRecord, row: &mut Record) -> Result<(), FieldError>;

    /// Post-processes the assembled dataset
    fn process_whole_dataset(&self, rows: Vec<Record>) -> Vec<Record> {
        rows
    }
}

/// Builds the source a configuration entry describes
pub fn build_source(entry: &SourceEntry) -> Result<Box<dyn Source>, HarvestError> {
    match entry.kind {
        SourceKind::CitationMeta => {
            let search_url = entry.search_url.as_deref().ok_or_else(|| {
                HarvestError::InvalidSource {
                    name: entry.name.clone(),
                    message: "missing search-url".to_string(),
                }
            })?;
            let selector = entry.link_selector.as_deref().ok_or_else(|| {
                HarvestError::InvalidSource {
                    name: entry.name.clone(),
                    message: "missing link-selector".to_string(),
                }
            })?;
            Ok(Box::new(CitationMetaSource::new(
                &entry.name,
                search_url,
                selector,
            )?))
        }
        SourceKind::UsaidApi => {
            let source = match &entry.api_url {
                Some(api_url) => UsaidSource::with_api_url(api_url),
                None => UsaidSource::new(),
            };
            Ok(Box::new(source))
        }
    }
}

const MAX_STEM_LEN: usize = 120;

/// File name an item identifier is stored under
///
/// Deterministic, so the presence of the file is the resume signal. Unless
/// the identifier is already a plain file name, a digest of the full
/// identifier is appended to keep distinct identifiers on distinct files.
pub fn item_file_name(id: &str) -> String {
    let without_scheme = id.split_once("://").map_or(id, |(_, rest)| rest);
    let stem: String = without_scheme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem == id && stem.len() <= MAX_STEM_LEN {
        return format!("{}.html", stem);
    }

    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    let cut = stem.len().min(MAX_STEM_LEN);
    format!("{}_{}.html", &stem[..cut], &digest[..16])
}

/// Full path an item identifier is stored under
pub fn item_path(folder: &Path, id: &str) -> PathBuf {
    folder.join(item_file_name(id))
}

/// Reads every completed item file in `folder`, sorted by name
pub fn load_item_files(folder: &Path) -> Result<Vec<NativeRecord>, HarvestError> {
    let entries = std::fs::read_dir(folder).map_err(|e| HarvestError::io(folder, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| HarvestError::io(folder, e))?.path();
        let is_partial = path.extension().is_some_and(|ext| ext == "part");
        if path.is_file() && !is_partial {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read(&path) {
            Ok(bytes) => records.push(NativeRecord::Document {
                name,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => tracing::warn!("Could not read {}: {}", path.display(), e),
        }
    }

    Ok(records)
}
