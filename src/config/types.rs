use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Scholar-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    /// Static headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
    #[serde(default, rename = "query")]
    pub queries: Vec<QueryEntry>,
}

impl Config {
    /// Looks up a source definition by name
    pub fn source(&self, name: &str) -> Option<&SourceEntry> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Resolves the folder items of a query are stored in
    pub fn query_folder(&self, query: &QueryEntry) -> PathBuf {
        match &query.folder {
            Some(folder) => PathBuf::from(folder),
            None => PathBuf::from(&self.output.data_dir)
                .join(&query.source)
                .join(sanitize_folder_name(&query.query)),
        }
    }
}

/// Crawler pacing and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Attempts per URL before a fetch is given up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rate-limit backoff unit; the n-th retry waits n units (milliseconds)
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Delay between items on a page (milliseconds)
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Delay after each result page (milliseconds)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Whether the page that ends a crawl also waits `page_delay_ms`
    #[serde(default = "default_true")]
    pub delay_after_last_page: bool,

    /// First result page when a query doesn't override it
    #[serde(default = "default_start_page")]
    pub start_page: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            backoff_unit_ms: default_backoff_unit_ms(),
            item_delay_ms: default_item_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            delay_after_last_page: true,
            start_page: default_start_page(),
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    100
}

fn default_backoff_unit_ms() -> u64 {
    10_000
}

fn default_item_delay_ms() -> u64 {
    1_000
}

fn default_page_delay_ms() -> u64 {
    3_000
}

fn default_start_page() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite ledger file
    pub ledger_path: String,

    /// Path to the CSV dataset file
    pub dataset_path: String,

    /// Parent folder for per-query item folders
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Year written when no valid year can be found for a record
    #[serde(default = "default_fallback_year")]
    pub fallback_year: i32,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_fallback_year() -> i32 {
    2018
}

/// Kinds of repository a source can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// HTML search listing whose item pages carry citation `<meta>` tags
    CitationMeta,
    /// The USAID Development Experience Clearinghouse JSON search API
    UsaidApi,
}

/// A named source definition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceEntry {
    pub name: String,

    pub kind: SourceKind,

    /// Search URL template with `{query}` and `{page}` placeholders
    #[serde(default)]
    pub search_url: Option<String>,

    /// CSS selector matching result links on a search page
    #[serde(default)]
    pub link_selector: Option<String>,

    /// Override for the API endpoint of API-backed sources
    #[serde(default)]
    pub api_url: Option<String>,
}

/// A query to crawl against one source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueryEntry {
    /// Name of the source this query runs against
    pub source: String,

    pub query: String,

    /// Folder item files are stored in
    #[serde(default)]
    pub folder: Option<String>,

    /// First result page, overriding `crawler.start-page`
    #[serde(default)]
    pub start_page: Option<u32>,
}

/// Turns a query string into a filesystem-safe folder name
pub fn sanitize_folder_name(query: &str) -> String {
    let name: String = query
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();

    if name.is_empty() {
        "query".to_string()
    } else {
        name
    }
}
