//! crawl-orchestra: a polite, partitioned site crawler
//!
//! This crate turns a declarative list of target sites into rate-limited,
//! retrying fetch sessions and stores every fetched page as an idempotent,
//! date-partitioned artifact.

pub mod config;
pub mod dispatcher;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod politeness;
pub mod robots;
pub mod session;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl-orchestra operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: session::SessionState,
        to: session::SessionState,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No valid sites selected for this run")]
    NoSitesSelected,

    #[error("Site '{site}' references unknown extractor '{extractor}'")]
    UnknownExtractor { site: String, extractor: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl-orchestra operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, SiteConfig};
pub use dispatcher::{Dispatcher, Selection};
pub use output::{RunReport, SessionReport};
pub use session::{CrawlSession, SessionState};
pub use storage::{Artifact, PartitionedStore};
