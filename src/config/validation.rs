use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, QueryEntry, SourceEntry, SourceKind, UserAgentConfig,
};
use crate::crawler::build_header_map;
use crate::ConfigError;
use chrono::Datelike;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_headers(&config.headers)?;
    validate_sources(&config.sources)?;
    validate_queries(&config.queries, &config.sources)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(
            "start_page must be >= 1 (pages are 1-based)".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger_path cannot be empty".to_string(),
        ));
    }

    if config.dataset_path.is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation("data_dir cannot be empty".to_string()));
    }

    let current_year = chrono::Utc::now().year();
    if config.fallback_year <= 1800 || config.fallback_year > current_year {
        return Err(ConfigError::Validation(format!(
            "fallback_year must be in (1800, {}], got {}",
            current_year, config.fallback_year
        )));
    }

    Ok(())
}

/// Validates static request headers by building the map the fetcher sends
fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    build_header_map(headers).map(|_| ())
}

/// Validates source definitions
fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for source in sources {
        if source.name.is_empty() {
            return Err(ConfigError::Validation(
                "Source name cannot be empty".to_string(),
            ));
        }

        if !names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source name '{}'",
                source.name
            )));
        }

        match source.kind {
            SourceKind::CitationMeta => validate_citation_meta(source)?,
            SourceKind::UsaidApi => {
                if let Some(api_url) = &source.api_url {
                    Url::parse(api_url).map_err(|e| {
                        ConfigError::InvalidUrl(format!(
                            "Invalid api-url for source '{}': {}",
                            source.name, e
                        ))
                    })?;
                }
            }
        }
    }

    Ok(())
}

fn validate_citation_meta(source: &SourceEntry) -> Result<(), ConfigError> {
    let search_url = source.search_url.as_deref().ok_or_else(|| {
        ConfigError::Validation(format!(
            "Source '{}' of kind citation-meta requires search-url",
            source.name
        ))
    })?;

    if !search_url.contains("{query}") || !search_url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "search-url of source '{}' must contain {{query}} and {{page}} placeholders",
            source.name
        )));
    }

    let sample = search_url.replace("{query}", "q").replace("{page}", "1");
    Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid search-url for source '{}': {}",
            source.name, e
        ))
    })?;

    let selector = source.link_selector.as_deref().ok_or_else(|| {
        ConfigError::Validation(format!(
            "Source '{}' of kind citation-meta requires link-selector",
            source.name
        ))
    })?;

    scraper::Selector::parse(selector).map_err(|_| {
        ConfigError::Validation(format!(
            "link-selector '{}' of source '{}' is not a valid CSS selector",
            selector, source.name
        ))
    })?;

    Ok(())
}

/// Validates query entries against the declared sources
fn validate_queries(queries: &[QueryEntry], sources: &[SourceEntry]) -> Result<(), ConfigError> {
    for query in queries {
        if !sources.iter().any(|s| s.name == query.source) {
            return Err(ConfigError::Validation(format!(
                "Query '{}' references unknown source '{}'",
                query.query, query.source
            )));
        }

        if query.query.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Query for source '{}' cannot be empty",
                query.source
            )));
        }

        if query.start_page == Some(0) {
            return Err(ConfigError::Validation(format!(
                "start-page of query '{}' must be >= 1",
                query.query
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
