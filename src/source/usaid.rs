//! USAID Development Experience Clearinghouse
//!
//! The clearinghouse exposes a JSON search API that returns a query's whole
//! result set in one response, so this source runs in single-request mode and
//! keeps that response as `results.json` in the query folder.

use crate::output::{extract_year, Record};
use crate::source::{CrawlMode, FieldError, NativeRecord, ParsedPage, Source};
use crate::HarvestError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Name of the stored API response inside a query folder
pub const RESULTS_FILE: &str = "results.json";

const DEFAULT_API_URL: &str = "https://dec.usaid.gov/api/qsearch.ashx";

/// Source backed by the clearinghouse search API
#[derive(Debug, Clone)]
pub struct UsaidSource {
    api_url: String,
}

impl Default for UsaidSource {
    fn default() -> Self {
        Self::new()
    }
}

impl UsaidSource {
    pub fn new() -> Self {
        Self::with_api_url(DEFAULT_API_URL)
    }

    pub fn with_api_url(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
        }
    }
}

/// The search terms of a clearinghouse search URL (everything after `?q=`)
fn search_terms(query: &str) -> Option<&str> {
    query
        .split_once("?q=")
        .map(|(_, terms)| terms)
        .filter(|terms| !terms.is_empty())
}

/// Reads `record[field]["value"]` as a list of strings
fn values(record: &Value, field: &str) -> Result<Vec<String>, FieldError> {
    let malformed = |message: &str| FieldError::Malformed {
        field: field.to_string(),
        message: message.to_string(),
    };

    let entries = record
        .get(field)
        .ok_or_else(|| FieldError::MissingField(field.to_string()))?
        .get("value")
        .ok_or_else(|| malformed("no 'value' key"))?
        .as_array()
        .ok_or_else(|| malformed("'value' is not an array"))?;

    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed("'value' holds a non-string entry"))
        })
        .collect()
}

fn records(value: &Value) -> &[Value] {
    value
        .get("Records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[async_trait]
impl Source for UsaidSource {
    fn name(&self) -> &str {
        "USAID"
    }

    fn crawl_mode(&self) -> CrawlMode {
        CrawlMode::SingleRequest
    }

    fn check_url(&self, query: &str) -> Option<String> {
        match search_terms(query) {
            Some(_) => None,
            None => Some("Query must be a USAID search url containing '?q='".to_string()),
        }
    }

    fn check_response(&self, response: &Value) -> Option<String> {
        match response.get("Records") {
            Some(Value::Array(_)) => None,
            Some(_) => Some("'Records' in the response is not an array".to_string()),
            None => Some("Response has no 'Records'".to_string()),
        }
    }

    fn prepare_query(&self, query: &str, _page: u32) -> String {
        format!(
            "{}?q={}&rtype=JSON",
            self.api_url,
            search_terms(query).unwrap_or(query)
        )
    }

    /// Record identifiers: each record's URI, or its index when it has none
    fn extract_links(&self, page: &ParsedPage) -> Vec<String> {
        let ParsedPage::Json(value) = page else {
            return Vec::new();
        };

        records(value)
            .iter()
            .enumerate()
            .map(|(index, record)| {
                values(record, "URI")
                    .ok()
                    .and_then(|uris| uris.into_iter().next())
                    .unwrap_or_else(|| index.to_string())
            })
            .collect()
    }

    fn load_native_records(&self, folder: &Path) -> Result<Vec<NativeRecord>, HarvestError> {
        let path = folder.join(RESULTS_FILE);
        if !path.exists() {
            tracing::warn!("No {} in {}", RESULTS_FILE, folder.display());
            return Ok(Vec::new());
        }

        let bytes = std::fs::read(&path).map_err(|e| HarvestError::io(&path, e))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|source| HarvestError::Decode {
            path: path.display().to_string(),
            source,
        })?;

        Ok(records(&value)
            .iter()
            .enumerate()
            .map(|(index, record)| NativeRecord::Json {
                name: format!("{}#{}", RESULTS_FILE, index),
                value: record.clone(),
            })
            .collect())
    }

    fn fill_fields(&self, native: &NativeRecord, row: &mut Record) -> Result<(), FieldError> {
        let NativeRecord::Json { value: meta, .. } = native else {
            return Err(FieldError::Malformed {
                field: native.name().to_string(),
                message: "expected a JSON record".to_string(),
            });
        };

        row.source_name = "USAID".to_string();
        row.abstract_text = values(meta, "Abstract")?.join("\n");
        row.title = values(meta, "Title")?.join("\n");

        let mut keywords = values(meta, "Descriptors_Topical")?;
        keywords.extend(values(meta, "Descriptors_Geographic")?);
        row.keywords = keywords.join(";");

        row.authors = values(meta, "Personal_Author")?.join(";");

        let created = values(meta, "Date_Resource_Created")?.join(" ");
        match extract_year(&created, row.year) {
            0 => {}
            year => row.year = Some(year),
        }

        row.url = values(meta, "URI")?.join(" ");
        row.affiliation = values(meta, "Inst_Author")?.join(";");
        row.journal_name = values(meta, "Series_Title")?.join(";");
        row.publisher = values(meta, "Inst_Publisher")?.join(";");

        Ok(())
    }
}
