//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for document repositories and run
//! fetches, crawls and dataset assembly end-to-end against temp folders.

mod crawl_tests;
mod dataset_tests;

use scholar_harvest::crawler::{FetchOptions, Fetcher, Pacing};
use scholar_harvest::source::CitationMetaSource;
use std::time::Duration;

/// A fetcher with millisecond backoff so retry tests stay fast
pub fn test_fetcher(max_attempts: u32) -> Fetcher {
    let options = FetchOptions {
        max_attempts,
        timeout: Duration::from_secs(5),
        backoff_unit: Duration::from_millis(1),
        ..FetchOptions::default()
    };
    Fetcher::with_client(reqwest::Client::new(), options)
}

pub fn no_delays() -> Pacing {
    Pacing::none()
}

/// A citation-meta source pointed at a mock server
pub fn repo_source(base_url: &str) -> CitationMetaSource {
    CitationMetaSource::new(
        "repo",
        &format!("{}/search?q={{query}}&page={{page}}", base_url),
        "a.hit",
    )
    .expect("test source is valid")
}

/// A search result page listing `paths` as hits
pub fn results_page(paths: &[&str]) -> String {
    let hits: String = paths
        .iter()
        .map(|p| format!(r#"<li><a class="hit" href="{}">{}</a></li>"#, p, p))
        .collect();
    format!(
        r#"<html><body><a href="/help">Help</a><ul>{}</ul></body></html>"#,
        hits
    )
}

/// An item page carrying citation meta tags
pub fn item_page(title: &str, date: &str) -> String {
    format!(
        r#"<html><head>
            <meta name="citation_title" content="{}">
            <meta name="citation_author" content="Doe, Jane">
            <meta name="citation_publication_date" content="{}">
        </head><body></body></html>"#,
        title, date
    )
}
