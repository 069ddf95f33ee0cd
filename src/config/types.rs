use crate::fetch::RenderMode;
use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Source name under which news feeds are crawled and stored
pub const NEWS_SOURCE: &str = "news";

/// Main configuration structure for crawl-orchestra
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub news: NewsConfig,
    /// Target sites keyed by their unique name
    #[serde(default)]
    pub websites: BTreeMap<String, WebsiteEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of crawl sessions running at once
    pub max_parallel_sessions: u32,

    /// Page limit for sites that do not set their own
    pub default_page_limit: u32,

    /// Minimum time between requests to the same site (milliseconds)
    pub min_delay_ms: u64,

    /// Maximum in-flight requests per site
    pub max_concurrent_requests: u32,

    /// How long a fetched robots.txt stays fresh (seconds)
    pub robots_ttl_secs: u64,

    /// Upper bound on the initial robots.txt fetch (milliseconds)
    pub robots_timeout_ms: u64,

    /// Per-request timeout for the static transport (milliseconds)
    pub request_timeout_ms: u64,

    /// Abort a session when the object store rejects a write
    pub abort_on_storage_failure: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_parallel_sessions: 4,
            default_page_limit: 100,
            min_delay_ms: 1000,
            max_concurrent_requests: 1,
            robots_ttl_secs: 24 * 60 * 60,
            robots_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            abort_on_storage_failure: false,
        }
    }
}

/// Retry and backoff settings for the fetch executor
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// Treat HTTP 429 without a Retry-After header as transient
    pub retry_rate_limited_without_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_ms: 250,
            retry_rate_limited_without_retry_after: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Which object store backs the partitioned store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Sqlite,
    Memory,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory (filesystem) or database file (sqlite)
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            path: "./data".to_string(),
        }
    }
}

/// Run report output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving `crawl_results_<timestamp>.json`
    pub results_dir: String,

    /// Optional markdown summary of the last run
    pub summary_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: "./results".to_string(),
            summary_path: None,
        }
    }
}

/// News feed ingestion
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub feeds: Vec<String>,
}

/// A site entry as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebsiteEntry {
    pub url: String,
    #[serde(default)]
    pub dynamic: bool,
    pub page_limit: Option<u32>,
    pub min_delay_ms: Option<u64>,
    pub max_concurrent_requests: Option<u32>,
    pub extractor: Option<String>,
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default = "default_follow_links")]
    pub follow_links: bool,
    pub render_wait_ms: Option<u64>,
    /// Site-specific fields consumed only by the extraction collaborator
    #[serde(flatten)]
    pub extra: toml::Table,
}

fn default_follow_links() -> bool {
    true
}

/// Fully resolved, immutable description of a crawl target
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub url: Url,
    /// Additional entry points seeded after `url`
    pub seeds: Vec<Url>,
    pub mode: RenderMode,
    pub page_limit: u32,
    pub min_delay: Duration,
    pub max_concurrent_requests: u32,
    pub extractor: Option<String>,
    pub follow_links: bool,
    pub render_wait: Duration,
    pub extra: toml::Table,
}

impl SiteConfig {
    /// Entry URLs in seeding order, starting with the base URL
    pub fn entry_urls(&self) -> Vec<Url> {
        let mut urls = vec![self.url.clone()];
        for seed in &self.seeds {
            if !urls.contains(seed) {
                urls.push(seed.clone());
            }
        }
        urls
    }

    /// Builds the synthetic static site used for news feed ingestion
    ///
    /// Every feed is seeded, links are never followed and the page limit
    /// equals the number of feeds.
    pub fn news(feeds: &[String], crawler: &CrawlerConfig) -> Result<Self, ConfigError> {
        let mut urls = feeds.iter().map(|feed| {
            Url::parse(feed)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid feed URL '{}': {}", feed, e)))
        });

        let first = urls
            .next()
            .ok_or_else(|| ConfigError::Validation("No news feeds configured".to_string()))??;
        let seeds = urls.collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: NEWS_SOURCE.to_string(),
            url: first,
            page_limit: feeds.len() as u32,
            seeds,
            mode: RenderMode::Static,
            min_delay: Duration::from_millis(crawler.min_delay_ms),
            max_concurrent_requests: crawler.max_concurrent_requests,
            extractor: None,
            follow_links: false,
            render_wait: Duration::ZERO,
            extra: toml::Table::new(),
        })
    }
}

impl Config {
    /// Resolves every configured website against the crawler defaults
    ///
    /// Sites are returned in name order.
    pub fn site_configs(&self) -> Result<Vec<SiteConfig>, ConfigError> {
        self.websites
            .iter()
            .map(|(name, entry)| self.resolve_site(name, entry))
            .collect()
    }

    fn resolve_site(&self, name: &str, entry: &WebsiteEntry) -> Result<SiteConfig, ConfigError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid URL '{}' for site '{}': {}", raw, name, e))
            })
        };

        let url = parse(&entry.url)?;
        let seeds = entry
            .seeds
            .iter()
            .map(|seed| parse(seed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SiteConfig {
            name: name.to_string(),
            url,
            seeds,
            mode: if entry.dynamic {
                RenderMode::Dynamic
            } else {
                RenderMode::Static
            },
            page_limit: entry
                .page_limit
                .unwrap_or(self.crawler.default_page_limit),
            min_delay: Duration::from_millis(
                entry.min_delay_ms.unwrap_or(self.crawler.min_delay_ms),
            ),
            max_concurrent_requests: entry
                .max_concurrent_requests
                .unwrap_or(self.crawler.max_concurrent_requests),
            extractor: entry.extractor.clone(),
            follow_links: entry.follow_links,
            render_wait: Duration::from_millis(entry.render_wait_ms.unwrap_or(5000)),
            extra: entry.extra.clone(),
        })
    }

    /// The news pseudo-site, when feeds are configured
    pub fn news_site(&self) -> Result<Option<SiteConfig>, ConfigError> {
        if self.news.feeds.is_empty() {
            return Ok(None);
        }
        SiteConfig::news(&self.news.feeds, &self.crawler).map(Some)
    }
}
