//! Fetch executor
//!
//! This module performs single page fetches for crawl sessions:
//! - Choosing the static (HTTP) or dynamic (headless browser) transport
//! - Waiting on the politeness gate before every attempt
//! - Classifying failures as transient or permanent
//! - Retrying transient failures with exponential backoff

mod executor;
mod render;
mod retry;
mod transport;

pub use executor::FetchExecutor;
#[cfg(feature = "headless")]
pub use render::HeadlessChromeEngine;
pub use render::{RenderEngine, UnavailableEngine};
pub use retry::{parse_retry_after, RetryPolicy};
pub use transport::{build_http_client, FetchedPage, HttpTransport, Transport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// How a site's pages are rendered before storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Plain HTTP GET
    Static,
    /// JavaScript executed in a headless browser
    Dynamic,
}

/// A single page to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub mode: RenderMode,
    /// Attempts made so far
    pub attempt: u32,
}

impl FetchRequest {
    pub fn new(url: Url, mode: RenderMode) -> Self {
        Self {
            url,
            mode,
            attempt: 0,
        }
    }
}

/// Outcome of resolving one [`FetchRequest`]
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The page was fetched
    Success {
        /// Raw response body
        body: Vec<u8>,
        /// Content-Type header value, if present
        content_type: Option<String>,
        /// HTTP status code
        status: u16,
        /// When the final attempt completed
        fetched_at: DateTime<Utc>,
        /// URL after redirects
        final_url: Url,
    },

    /// Every attempt failed with a retryable error
    TransientFailure { reason: FetchError, attempts: u32 },

    /// A non-retryable error ended the request
    PermanentFailure { reason: FetchError },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Reasons a fetch attempt fails
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Rate limited: HTTP {status}")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("Client error: HTTP {status}")]
    ClientError { status: u16 },

    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Render engine failure: {0}")]
    RenderEngine(String),

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Returns true for errors worth another attempt
    ///
    /// Timeouts, connection failures, 5xx and 429 are transient. Other 4xx,
    /// malformed content, render engine failures and cancellation are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::ServerError { .. } | Self::RateLimited { .. }
        )
    }

    /// Short machine-readable label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection(_) => "connection",
            Self::ServerError { .. } => "server_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::ClientError { .. } => "client_error",
            Self::MalformedContent(_) => "malformed_content",
            Self::RenderEngine(_) => "render_engine",
            Self::Cancelled => "cancelled",
            Self::Request(_) => "request",
        }
    }

    /// Classifies a reqwest error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() || error.is_body() {
            Self::Connection(error.to_string())
        } else if error.is_decode() {
            Self::MalformedContent(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), None)
        } else {
            Self::Request(error.to_string())
        }
    }

    /// Maps a non-success HTTP status to an error
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited {
                status,
                retry_after,
            },
            500..=599 => Self::ServerError { status },
            _ => Self::ClientError { status },
        }
    }
}
