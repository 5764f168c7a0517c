//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlStatus`: Status of a query's ledger record (in progress, finished, finished with errors)
//! - `SeenSet`: Identifiers already processed during the current run

mod crawl_status;
mod seen_set;

pub use crawl_status::CrawlStatus;
pub use seen_set::SeenSet;
