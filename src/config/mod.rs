//! Configuration module for crawl-orchestra
//!
//! This module handles loading, parsing, and validating TOML configuration files
//! and resolving website entries into immutable [`SiteConfig`] values.
//!
//! # Example
//!
//! ```no_run
//! use crawl_orchestra::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! for site in config.site_configs().unwrap() {
//!     println!("{} -> {}", site.name, site.url);
//! }
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, NewsConfig, OutputConfig, RetryConfig, SiteConfig, StorageBackend,
    StorageConfig, UserAgentConfig, WebsiteEntry, NEWS_SOURCE,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
