//! URL handling module for crawl-orchestra
//!
//! This module provides URL normalization for frontier deduplication and the
//! same-origin scope rule that decides which discovered links a session may
//! follow.

mod normalize;

pub use normalize::{normalize, normalize_url};

use url::Url;

/// Returns true if `candidate` belongs to the same origin as `base`
///
/// Origin is scheme, host and effective port. A site's crawl never leaves
/// the origin of its base URL.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_orchestra::url::same_origin;
///
/// let base = Url::parse("https://example.com/start").unwrap();
/// assert!(same_origin(&base, &Url::parse("https://example.com/other").unwrap()));
/// assert!(!same_origin(&base, &Url::parse("https://other.com/").unwrap()));
/// assert!(!same_origin(&base, &Url::parse("http://example.com/").unwrap()));
/// ```
pub fn same_origin(base: &Url, candidate: &Url) -> bool {
    base.origin() == candidate.origin()
}

/// Returns the robots.txt URL for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    if url.host_str().is_none() {
        return None;
    }
    url.join("/robots.txt").ok()
}

/// Returns the path plus query of a URL, the form robots rules match against
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
