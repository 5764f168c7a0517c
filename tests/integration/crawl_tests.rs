//! Pagination, deduplication and ledger reporting end-to-end

use crate::{item_page, no_delays, repo_source, results_page, test_fetcher};
use scholar_harvest::crawler::{Coordinator, CrawlReport, Fetcher, Termination};
use scholar_harvest::source::{item_path, Source};
use scholar_harvest::state::CrawlStatus;
use scholar_harvest::storage::{Ledger, SqliteLedger};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves result page `page` listing `paths`
async fn mount_page(server: &MockServer, page: &str, paths: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(paths)))
        .mount(server)
        .await;
}

/// Every page not mounted explicitly lists nothing
async fn mount_empty_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(&[])))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_item(server: &MockServer, item: &str, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(item))
        .respond_with(ResponseTemplate::new(200).set_body_string(item_page(item, "2019")))
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Serves an item and cancels the crawl while doing so
struct CancelWhileServing {
    cancel: CancellationToken,
    body: String,
}

impl Respond for CancelWhileServing {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.cancel.cancel();
        ResponseTemplate::new(200).set_body_string(self.body.clone())
    }
}

async fn run(
    source: &dyn Source,
    fetcher: &Fetcher,
    ledger: &mut SqliteLedger,
    query: &str,
    folder: &Path,
    start_page: Option<u32>,
) -> CrawlReport {
    Coordinator::new(source, fetcher, ledger, no_delays(), CancellationToken::new())
        .crawl_query(query, folder, start_page)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_malaria_scenario() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["/item/1", "/item/2"]).await;
    mount_empty_pages(&server).await;
    mount_item(&server, "/item/1", 1).await;
    mount_item(&server, "/item/2", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;

    assert_eq!(report.termination, Termination::Exhausted);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.items_processed, 2);
    assert_eq!(report.items_downloaded, 2);

    // One results update for page 1; nothing for the empty page 2
    let pages = ledger.page_results("malaria").unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].new_items, 2);
    assert_eq!(pages[0].page_items, 2);

    // Never finalized to Finished
    let record = ledger.get_record("malaria").unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::InProgress);
    assert_eq!(record.total_count, 2);
    assert_eq!(record.message, None);

    for item in ["/item/1", "/item/2"] {
        let id = format!("{}{}", server.uri(), item);
        assert!(item_path(dir.path(), &id).exists());
    }
}

#[tokio::test]
async fn test_rejected_query_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "   ", dir.path(), None).await;

    assert!(matches!(report.termination, Termination::Rejected(_)));
    let record = ledger.get_record("   ").unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::FinishedWithErrors);
    assert_eq!(record.message.as_deref(), Some("Query is empty"));
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["/item/1", "/item/2"]).await;
    mount_empty_pages(&server).await;
    // Each item is downloaded exactly once across both runs
    mount_item(&server, "/item/1", 1).await;
    mount_item(&server, "/item/2", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let first = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;
    let second = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;

    assert_eq!(first.items_downloaded, 2);
    assert_eq!(second.items_downloaded, 0);
    assert_eq!(second.termination, Termination::Exhausted);
}

#[tokio::test]
async fn test_duplicates_across_pages_are_processed_once() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["/item/1", "/item/2"]).await;
    mount_page(&server, "2", &["/item/2", "/item/3"]).await;
    // Only duplicates: indistinguishable from an empty page
    mount_page(&server, "3", &["/item/3"]).await;
    mount_empty_pages(&server).await;
    mount_item(&server, "/item/1", 1).await;
    mount_item(&server, "/item/2", 1).await;
    mount_item(&server, "/item/3", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.items_processed, 3);

    let pages: Vec<(u64, u64)> = ledger
        .page_results("malaria")
        .unwrap()
        .iter()
        .map(|p| (p.new_items, p.page_items))
        .collect();
    assert_eq!(pages, vec![(2, 2), (1, 2)]);

    let page_four_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.contains("page=4")))
        .count();
    assert_eq!(page_four_requests, 0);
}

#[tokio::test]
async fn test_start_page_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(&["/item/1"])))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "3", &["/item/3"]).await;
    mount_empty_pages(&server).await;
    mount_item(&server, "/item/3", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), Some(3)).await;

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.items_processed, 1);
}

#[tokio::test]
async fn test_failed_item_is_recorded_and_crawl_continues() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["/item/1", "/item/2"]).await;
    mount_empty_pages(&server).await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_item(&server, "/item/2", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;

    assert_eq!(report.items_processed, 2);
    assert_eq!(report.items_downloaded, 1);

    // The error status survives the later results update
    let record = ledger.get_record("malaria").unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::FinishedWithErrors);
    assert_eq!(record.total_count, 2);
    let message = record.message.unwrap();
    assert!(message.starts_with("The problem with url"));
    assert!(message.contains("/item/1"));
}

#[tokio::test]
async fn test_failed_first_page_ends_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = run(&source, &fetcher, &mut ledger, "malaria", dir.path(), None).await;

    assert_eq!(report.termination, Termination::Exhausted);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.items_processed, 0);

    let record = ledger.get_record("malaria").unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::FinishedWithErrors);
    assert!(ledger.page_results("malaria").unwrap().is_empty());
}

#[tokio::test]
async fn test_crawl_runs_every_configured_query() {
    let server = MockServer::start().await;
    mount_page(&server, "1", &["/item/1"]).await;
    mount_empty_pages(&server).await;
    mount_item(&server, "/item/1", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.db");
    let data_dir = dir.path().join("data");
    let toml = format!(
        r#"
[crawler]
backoff-unit-ms = 1
item-delay-ms = 0
page-delay-ms = 0

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
ledger-path = "{ledger}"
dataset-path = "{dataset}"
data-dir = "{data}"

[[source]]
name = "repo"
kind = "citation-meta"
search-url = "{base}/search?q={{query}}&page={{page}}"
link-selector = "a.hit"

[[source]]
name = "usaid"
kind = "usaid-api"
api-url = "{base}/api/qsearch.ashx"

[[query]]
source = "repo"
query = "malaria"

[[query]]
source = "usaid"
query = "malaria without a search url"
"#,
        ledger = ledger_path.display(),
        dataset = dir.path().join("dataset.csv").display(),
        data = data_dir.display(),
        base = server.uri(),
    );
    let config_path = dir.path().join("harvest.toml");
    std::fs::write(&config_path, toml).unwrap();

    let config = scholar_harvest::config::load_config(&config_path).unwrap();
    let reports = scholar_harvest::crawler::crawl(config, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].items_downloaded, 1);
    assert!(matches!(reports[1].termination, Termination::Rejected(_)));
    assert!(data_dir.join("repo").join("malaria").is_dir());

    let ledger = SqliteLedger::new(&ledger_path).unwrap();
    let records = ledger.list_records().unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_cancel_mid_page_reports_partial_page() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    mount_page(&server, "1", &["/item/1", "/item/2", "/item/3"]).await;
    mount_empty_pages(&server).await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(CancelWhileServing {
            cancel: cancel.clone(),
            body: item_page("/item/1", "2019"),
        })
        .expect(1)
        .mount(&server)
        .await;
    mount_item(&server, "/item/2", 0).await;
    mount_item(&server, "/item/3", 0).await;

    let dir = tempfile::tempdir().unwrap();
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    let report = Coordinator::new(&source, &fetcher, &mut ledger, no_delays(), cancel)
        .crawl_query("malaria", dir.path(), None)
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Cancelled);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.items_processed, 1);
    assert_eq!(report.items_downloaded, 1);

    // The partial page is still reported
    let pages = ledger.page_results("malaria").unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].new_items, 1);
    assert_eq!(pages[0].page_items, 3);

    let record = ledger.get_record("malaria").unwrap().unwrap();
    assert_eq!(record.status, CrawlStatus::InProgress);
    assert_eq!(record.total_count, 1);

    // No request for page 2 either
    let page_two_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.contains("page=2")))
        .count();
    assert_eq!(page_two_requests, 0);
}
