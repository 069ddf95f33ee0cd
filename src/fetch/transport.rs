use crate::config::UserAgentConfig;
use crate::fetch::{parse_retry_after, FetchError};
use crate::robots::{RobotsFetch, RobotsSource};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A page returned by one transport attempt
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub status: u16,
    pub final_url: Url,
}

/// Performs exactly one fetch attempt
///
/// Retries, backoff and politeness are the executor's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// The user agent is formatted as `CrawlerName/Version (+ContactURL; ContactEmail)`.
///
/// # Example
///
/// ```no_run
/// use crawl_orchestra::config::UserAgentConfig;
/// use crawl_orchestra::fetch::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "crawl-orchestra".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Static transport: a plain reqwest GET
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            debug!(url = %url, status = status.as_u16(), "Non-success response");
            return Err(FetchError::from_status(status.as_u16(), retry_after));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        if body.is_empty() {
            return Err(FetchError::MalformedContent("empty body".to_string()));
        }

        Ok(FetchedPage {
            body: body.to_vec(),
            content_type,
            status: status.as_u16(),
            final_url,
        })
    }
}

#[async_trait]
impl RobotsSource for HttpTransport {
    async fn fetch_robots(&self, robots_url: &Url) -> RobotsFetch {
        let response = match self.client.get(robots_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return RobotsFetch::Unavailable(e.to_string()),
        };

        let status = response.status();
        if status.is_client_error() {
            return RobotsFetch::Missing;
        }
        if !status.is_success() {
            return RobotsFetch::Unavailable(format!("HTTP {}", status.as_u16()));
        }

        match response.text().await {
            Ok(body) => RobotsFetch::Found(body),
            Err(e) => RobotsFetch::Unavailable(e.to_string()),
        }
    }
}
