//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Skip-if-exists short-circuiting for already-downloaded items
//! - Linear backoff on HTTP 429
//! - Persisting response bodies to disk
//! - Error classification

use crate::config::{Config, UserAgentConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a fetch produced no data
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("response from {url} is not valid JSON: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// The URL the failed request was for, when there is one
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Status { url, .. } | Self::Transport { url, .. } | Self::Json { url, .. } => {
                Some(url)
            }
            Self::Io { .. } => None,
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The destination already existed; no request was made
    Skipped,

    /// The response body (also written to the destination, if one was given)
    Bytes(Vec<u8>),
}

/// Retry and request settings shared by every fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_attempts: u32,
    pub timeout: Duration,
    /// The n-th consecutive 429 waits `n * backoff_unit`
    pub backoff_unit: Duration,
    pub headers: HeaderMap,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            timeout: Duration::from_secs(100),
            backoff_unit: Duration::from_secs(10),
            headers: HeaderMap::new(),
        }
    }
}

impl FetchOptions {
    /// Builds options from the `[crawler]` and `[headers]` configuration
    pub fn from_config(config: &Config) -> Result<Self, crate::ConfigError> {
        Ok(Self {
            max_attempts: config.crawler.max_attempts,
            timeout: config.crawler.timeout(),
            backoff_unit: config.crawler.backoff_unit(),
            headers: build_header_map(&config.headers)?,
        })
    }
}

/// Converts configured header pairs into a request header map
pub fn build_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, crate::ConfigError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| crate::ConfigError::Validation(format!("Invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            crate::ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Delay before retrying after the `attempt`-th (0-based) rate-limited response
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit * (attempt + 1)
}

/// Builds an HTTP client with proper configuration
///
/// The client keeps a cookie store, so it doubles as the crawl's session.
///
/// # Example
///
/// ```no_run
/// use scholar_harvest::config::UserAgentConfig;
/// use scholar_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "ScholarHarvest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.org/bot".to_string(),
///     contact_email: "bot@example.org".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs GETs with bounded retry on rate limiting
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    options: FetchOptions,
}

impl Fetcher {
    /// Creates a fetcher with its own client
    pub fn new(user_agent: &UserAgentConfig, options: FetchOptions) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(user_agent)?, options))
    }

    /// Creates a fetcher around an existing client (and its cookies)
    pub fn with_client(client: Client, options: FetchOptions) -> Self {
        Self { client, options }
    }

    /// Fetches a URL, optionally persisting the body
    ///
    /// If `destination` already exists the call returns `FetchOutcome::Skipped`
    /// without touching the network. Otherwise the body is written to
    /// `destination` (when given) and returned.
    pub async fn fetch(
        &self,
        url: &str,
        destination: Option<&Path>,
    ) -> Result<FetchOutcome, FetchError> {
        match destination {
            Some(path) => {
                tracing::info!("Fetch {} to {}", url, path.display());
                if path.exists() {
                    tracing::info!("Already exists. Skipped.");
                    return Ok(FetchOutcome::Skipped);
                }
            }
            None => tracing::info!("Fetch {}", url),
        }

        let body = self.get_with_retry(url).await?;

        if let Some(path) = destination {
            persist(path, &body).map_err(|source| FetchError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        Ok(FetchOutcome::Bytes(body))
    }

    /// Fetches a URL and decodes the body as JSON
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        tracing::info!("Fetch {}", url);
        let body = self.get_with_retry(url).await?;
        let value = serde_json::from_slice(&body).map_err(|source| FetchError::Json {
            url: url.to_string(),
            source,
        })?;
        tracing::debug!("Response converted to json");
        Ok(value)
    }

    /// Runs the retry loop and returns the body of a successful response
    async fn get_with_retry(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = retry_rate_limited(
            self.options.max_attempts,
            self.options.backoff_unit,
            |response: &reqwest::Response| response.status() == StatusCode::TOO_MANY_REQUESTS,
            || {
                self.client
                    .get(url)
                    .headers(self.options.headers.clone())
                    .timeout(self.options.timeout)
                    .send()
            },
        )
        .await
        .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        tracing::debug!("Url was searched ({} bytes)", body.len());
        Ok(body.to_vec())
    }
}

/// Sends until a response is not rate limited or `max_attempts` is reached
///
/// The n-th rate-limited response is followed by a `backoff_delay(unit, n - 1)`
/// sleep, except when it was the last attempt. The last response is returned
/// either way.
async fn retry_rate_limited<R, E, Fut>(
    max_attempts: u32,
    unit: Duration,
    is_rate_limited: impl Fn(&R) -> bool,
    mut send: impl FnMut() -> Fut,
) -> Result<R, E>
where
    Fut: Future<Output = Result<R, E>>,
{
    let mut attempt = 0;
    loop {
        let response = send().await?;
        if !is_rate_limited(&response) {
            return Ok(response);
        }

        attempt += 1;
        if attempt >= max_attempts {
            return Ok(response);
        }

        let delay = backoff_delay(unit, attempt - 1);
        tracing::info!("Retrying in {} seconds", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

/// Writes `body` next to `path` and renames it into place
///
/// The rename keeps a half-written file from ever looking like a finished
/// download to the skip-if-exists check.
pub(crate) fn persist(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    std::fs::write(&partial, body)?;
    std::fs::rename(&partial, path)
}
