//! Crawl, assemble and export to CSV

use crate::{item_page, no_delays, repo_source, results_page, test_fetcher};
use scholar_harvest::crawler::Coordinator;
use scholar_harvest::config::{load_config, Config};
use scholar_harvest::output::{assemble_dataset, export_dataset, CsvDatasetWriter, DatasetWriter};
use scholar_harvest::source::RESULTS_FILE;
use scholar_harvest::storage::SqliteLedger;
use scholar_harvest::HarvestError;
use serde_json::json;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_crawled_items_export_to_csv() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(results_page(&["/item/a", "/item/b", "/item/c"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(&[])))
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(item_page("Vector control", "2016-03-01")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(item_page("Undated survey", "n.d.")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/c"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>no metadata</body></html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("repo").join("malaria");
    let source = repo_source(&server.uri());
    let fetcher = test_fetcher(10);
    let mut ledger = SqliteLedger::new_in_memory().unwrap();

    Coordinator::new(
        &source,
        &fetcher,
        &mut ledger,
        no_delays(),
        CancellationToken::new(),
    )
    .crawl_query("malaria", &folder, None)
    .await
    .unwrap();

    let rows = assemble_dataset(&source, &folder, 2018).unwrap();
    // One row per stored item, including the one without metadata
    assert_eq!(rows.len(), 3);

    let csv_path = dir.path().join("dataset.csv");
    let written = CsvDatasetWriter::new(&csv_path).write_rows(&rows).unwrap();
    assert_eq!(written, 3);

    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), 10);
    assert_eq!(&headers[0], "abstract");
    assert_eq!(&headers[9], "source_name");

    let mut by_title = std::collections::HashMap::new();
    for result in reader.records() {
        let row = result.unwrap();
        by_title.insert(row[1].to_string(), row[6].to_string());
    }
    assert_eq!(by_title.get("Vector control").map(String::as_str), Some("2016"));
    assert_eq!(by_title.get("Undated survey").map(String::as_str), Some("2018"));
    // The unmapped row keeps an empty title and no year
    assert_eq!(by_title.get("").map(String::as_str), Some(""));
}

#[tokio::test]
async fn test_empty_folder_exports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = repo_source("http://127.0.0.1:9");

    let rows = assemble_dataset(&source, dir.path(), 2018).unwrap();
    assert!(rows.is_empty());

    let csv_path = dir.path().join("dataset.csv");
    assert_eq!(CsvDatasetWriter::new(&csv_path).write_rows(&rows).unwrap(), 0);
    assert!(!csv_path.exists());
}

/// Config with one clearinghouse query whose dataset goes to `dataset`
fn export_config(dir: &Path, dataset: &Path) -> Config {
    let toml = format!(
        r#"
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
name = "usaid"
kind = "usaid-api"

[[query]]
source = "usaid"
query = "https://dec.usaid.gov/dec/search?q=malaria"
"#,
        ledger = dir.join("ledger.db").display(),
        dataset = dataset.display(),
        data = dir.join("data").display(),
    );
    let path = dir.join("harvest.toml");
    std::fs::write(&path, toml).unwrap();
    load_config(&path).unwrap()
}

fn store_results(config: &Config) {
    let folder = config.query_folder(&config.queries[0]);
    std::fs::create_dir_all(&folder).unwrap();
    let body = json!({
        "Records": [{
            "Abstract": { "value": ["An evaluation."] },
            "Title": { "value": ["Malaria in Kenya"] },
            "Descriptors_Topical": { "value": [] },
            "Descriptors_Geographic": { "value": [] },
            "Personal_Author": { "value": [] },
            "Date_Resource_Created": { "value": ["2012"] },
            "URI": { "value": ["https://pdf.usaid.gov/1.pdf"] },
            "Inst_Author": { "value": [] },
            "Series_Title": { "value": [] },
            "Inst_Publisher": { "value": [] },
        }]
    });
    std::fs::write(folder.join(RESULTS_FILE), body.to_string()).unwrap();
}

#[test]
fn test_export_dataset_writes_every_query() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("out").join("dataset.csv");
    let config = export_config(dir.path(), &dataset);
    store_results(&config);

    assert_eq!(export_dataset(&config).unwrap(), 1);

    let mut reader = csv::Reader::from_path(&dataset).unwrap();
    let row = reader.records().next().unwrap().unwrap();
    assert_eq!(&row[1], "Malaria in Kenya");
    assert_eq!(&row[6], "2012");
}

#[test]
fn test_export_dataset_skips_uncrawled_queries() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("dataset.csv");
    let config = export_config(dir.path(), &dataset);

    assert_eq!(export_dataset(&config).unwrap(), 0);
    assert!(!dataset.exists());
}

#[test]
fn test_export_dataset_reports_unwritable_destination() {
    let dir = tempfile::tempdir().unwrap();
    // The destination's parent is a regular file
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let config = export_config(dir.path(), &blocker.join("dataset.csv"));
    store_results(&config);

    let result = export_dataset(&config);
    assert!(matches!(result, Err(HarvestError::Output(_))));
}
