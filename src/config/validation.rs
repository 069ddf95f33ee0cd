use crate::config::types::{
    Config, CrawlerConfig, RetryConfig, UserAgentConfig, WebsiteEntry, NEWS_SOURCE,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.websites.is_empty() && config.news.feeds.is_empty() {
        return Err(ConfigError::Validation(
            "At least one website or news feed must be configured".to_string(),
        ));
    }

    for (name, entry) in &config.websites {
        validate_website(name, entry)?;
    }

    for feed in &config.news.feeds {
        validate_http_url(feed, "news feed")?;
    }

    if !config.news.feeds.is_empty() && config.websites.contains_key(NEWS_SOURCE) {
        return Err(ConfigError::Validation(format!(
            "Website name '{}' is reserved while news feeds are configured",
            NEWS_SOURCE
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_parallel_sessions < 1 || config.max_parallel_sessions > 64 {
        return Err(ConfigError::Validation(format!(
            "max-parallel-sessions must be between 1 and 64, got {}",
            config.max_parallel_sessions
        )));
    }

    if config.default_page_limit < 1 {
        return Err(ConfigError::Validation(
            "default-page-limit must be >= 1".to_string(),
        ));
    }

    if config.max_concurrent_requests < 1 {
        return Err(ConfigError::Validation(
            "max-concurrent-requests must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 || config.robots_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request and robots timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "multiplier must be a finite number >= 1.0, got {}",
            config.multiplier
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
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

/// Validates a single website entry
fn validate_website(name: &str, entry: &WebsiteEntry) -> Result<(), ConfigError> {
    validate_site_name(name)?;
    validate_http_url(&entry.url, name)?;

    for seed in &entry.seeds {
        validate_http_url(seed, name)?;
    }

    if entry.page_limit == Some(0) {
        return Err(ConfigError::Validation(format!(
            "Site '{}' page-limit must be a positive integer",
            name
        )));
    }

    if entry.max_concurrent_requests == Some(0) {
        return Err(ConfigError::Validation(format!(
            "Site '{}' max-concurrent-requests must be >= 1",
            name
        )));
    }

    Ok(())
}

/// Site names double as storage path segments
fn validate_site_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "Site name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Site name '{}' may only contain ASCII letters, digits, '-' and '_'",
            name
        )));
    }

    Ok(())
}

fn validate_http_url(raw: &str, owner: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid URL '{}' ({}): {}", raw, owner, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "URL '{}' ({}) must use http or https",
            raw, owner
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "URL '{}' ({}) has no host",
            raw, owner
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
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
