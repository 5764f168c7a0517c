//! The normalized bibliographic row and its year rules

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// One normalized bibliographic entry
///
/// Field order is the dataset's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub title: String,
    pub keywords: String,
    pub authors: String,
    pub journal_name: String,
    pub publisher: String,
    pub year: Option<i32>,
    pub url: String,
    pub affiliation: String,
    pub source_name: String,
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[0-9]{4}").expect("year pattern is a valid regex"))
}

/// Appends `value` to a `;`-separated field
pub fn append_joined(field: &mut String, value: &str) {
    if !field.is_empty() {
        field.push(';');
    }
    field.push_str(value);
}

/// Whether `year` is a plausible publication year: (1800, current year]
pub fn is_valid_year(year: i32) -> bool {
    year > 1800 && year <= chrono::Utc::now().year()
}

/// Finds the earliest plausible year in `text`
///
/// Every run of four digits is a candidate; only valid years count. The result
/// is the minimum of the valid candidates and `old_year` (when non-zero), or
/// `0` when there is nothing to choose from.
pub fn extract_year(text: &str, old_year: Option<i32>) -> i32 {
    let mut best = old_year.filter(|year| *year != 0);

    for candidate in year_pattern().find_iter(text) {
        let Ok(year) = candidate.as_str().parse::<i32>() else {
            continue;
        };
        if is_valid_year(year) {
            best = Some(best.map_or(year, |current| current.min(year)));
        }
    }

    best.unwrap_or(0)
}

/// Ensures a row carries a valid year
///
/// Keeps a valid year, otherwise looks in the title and abstract, otherwise
/// uses `fallback`.
pub fn fill_year_if_not_found(row: &mut Record, fallback: i32) {
    if row.year.is_some_and(is_valid_year) {
        return;
    }

    let text = format!("{}.{}", row.title, row.abstract_text);
    row.year = match extract_year(&text, None) {
        0 => Some(fallback),
        year => Some(year),
    };
}
