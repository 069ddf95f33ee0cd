//! Extraction collaborators
//!
//! Turns a fetched page into a structured record plus the links it points
//! to. Sites pick a handler by hook identifier; the [`DefaultExtractor`]
//! covers every site that does not.

mod html;
mod registry;

pub use html::{parse_html, DefaultExtractor, ParsedPage};
pub use registry::{ExtractorRegistry, DEFAULT_EXTRACTOR};

use crate::config::SiteConfig;
use thiserror::Error;
use url::Url;

/// Output of one extraction
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Structured record handed back to the caller
    pub record: serde_json::Value,
    /// Absolute links discovered on the page
    pub links: Vec<Url>,
}

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Unsupported content type: {0}")]
    Unsupported(String),

    #[error("Extractor failed: {0}")]
    Other(String),
}

/// Per-site extraction logic
pub trait Extractor: Send + Sync {
    /// Parses a raw page
    ///
    /// # Arguments
    ///
    /// * `raw` - The response body as fetched
    /// * `content_type` - Content-Type header value, if any
    /// * `page_url` - Final URL of the page, used to resolve relative links
    /// * `site` - The site being crawled, including its custom fields
    fn parse(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
        page_url: &Url,
        site: &SiteConfig,
    ) -> Result<Extraction, ExtractError>;
}
