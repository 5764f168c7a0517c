//! Generic source for repositories that tag item pages with citation `<meta>`s
//!
//! Most institutional repositories (DSpace, EPrints, OJS and friends) emit the
//! Highwire Press `citation_*` tags and/or Dublin Core `DC.*` tags on item
//! pages. Search listings differ per site, so the request URL template and the
//! CSS selector for result links come from configuration.

use crate::output::{append_joined, extract_year, Record};
use crate::source::{FieldError, NativeRecord, ParsedPage, Source};
use crate::HarvestError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use url::form_urlencoded;
use url::Url;

/// Source driven by a search URL template and a result-link selector
#[derive(Debug, Clone)]
pub struct CitationMetaSource {
    name: String,
    search_url: String,
    link_selector: String,
    base_url: Url,
}

impl CitationMetaSource {
    /// Creates a source
    ///
    /// # Arguments
    ///
    /// * `name` - Source name, written to the `source_name` column
    /// * `search_url` - URL template with `{query}` and `{page}` placeholders
    /// * `link_selector` - CSS selector matching result links on a search page
    pub fn new(name: &str, search_url: &str, link_selector: &str) -> Result<Self, HarvestError> {
        let invalid = |message: String| HarvestError::InvalidSource {
            name: name.to_string(),
            message,
        };

        Selector::parse(link_selector)
            .map_err(|_| invalid(format!("invalid link selector '{}'", link_selector)))?;

        let sample = search_url.replace("{query}", "").replace("{page}", "1");
        let base_url =
            Url::parse(&sample).map_err(|e| invalid(format!("invalid search url: {}", e)))?;

        Ok(Self {
            name: name.to_string(),
            search_url: search_url.to_string(),
            link_selector: link_selector.to_string(),
            base_url,
        })
    }
}

#[async_trait]
impl Source for CitationMetaSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_url(&self, query: &str) -> Option<String> {
        if query.trim().is_empty() {
            return Some("Query is empty".to_string());
        }

        let request = self.prepare_query(query, 1);
        Url::parse(&request)
            .err()
            .map(|e| format!("Request url {} is invalid: {}", request, e))
    }

    fn prepare_query(&self, query: &str, page: u32) -> String {
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url
            .replace("{query}", &encoded)
            .replace("{page}", &page.to_string())
    }

    fn extract_links(&self, page: &ParsedPage) -> Vec<String> {
        let ParsedPage::Markup(html) = page else {
            return Vec::new();
        };

        let Ok(selector) = Selector::parse(&self.link_selector) else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, &self.base_url))
            .collect()
    }

    fn fill_fields(&self, native: &NativeRecord, row: &mut Record) -> Result<(), FieldError> {
        let NativeRecord::Document { body, .. } = native else {
            return Err(FieldError::Malformed {
                field: native.name().to_string(),
                message: "expected an HTML document".to_string(),
            });
        };

        let document = Html::parse_document(body);
        let meta = MetaTags::collect(&document);

        row.source_name = self.name.clone();

        row.title = meta
            .first(&["citation_title", "dc.title"])
            .or_else(|| page_title(&document))
            .ok_or(FieldError::NoMetadata)?;

        if let Some(abstract_text) =
            meta.first(&["citation_abstract", "dc.description", "description"])
        {
            row.abstract_text = abstract_text;
        }

        for value in meta.all("citation_keywords") {
            for keyword in value.split([';', ',']).map(str::trim) {
                if !keyword.is_empty() {
                    append_joined(&mut row.keywords, keyword);
                }
            }
        }

        row.authors = meta.all("citation_author").join(";");
        row.affiliation = meta.all("citation_author_institution").join(";");

        if let Some(journal) = meta.first(&["citation_journal_title"]) {
            row.journal_name = journal;
        }

        if let Some(publisher) = meta.first(&["citation_publisher", "dc.publisher"]) {
            row.publisher = publisher;
        }

        if let Some(date) = meta.first(&["citation_publication_date", "citation_date", "dc.date"])
        {
            match extract_year(&date, row.year) {
                0 => {}
                year => row.year = Some(year),
            }
        }

        if let Some(url) = meta.first(&["citation_abstract_html_url", "citation_pdf_url", "og:url"])
        {
            row.url = url;
        }

        Ok(())
    }
}

/// `<meta>` tags of a document as (lowercased key, content) pairs
struct MetaTags {
    tags: Vec<(String, String)>,
}

impl MetaTags {
    fn collect(document: &Html) -> Self {
        let mut tags = Vec::new();

        if let Ok(selector) = Selector::parse("meta[content]") {
            for element in document.select(&selector) {
                let meta = element.value();
                let key = meta.attr("name").or_else(|| meta.attr("property"));
                if let (Some(key), Some(content)) = (key, meta.attr("content")) {
                    let content = content.trim();
                    if !content.is_empty() {
                        tags.push((key.to_ascii_lowercase(), content.to_string()));
                    }
                }
            }
        }

        Self { tags }
    }

    /// Every value of one key, in document order
    fn all(&self, key: &str) -> Vec<String> {
        self.tags
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// First value of the first key (in preference order) that is present
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.tags.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone())
    }
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves a link href to an absolute URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links, and anything that isn't HTTP(S) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}
