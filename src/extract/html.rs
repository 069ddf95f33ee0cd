use crate::config::SiteConfig;
use crate::extract::{ExtractError, Extraction, Extractor};
use scraper::{Html, Selector};
use serde_json::json;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// `<meta name="description">` content
    pub description: Option<String>,

    /// `<link rel="canonical">` target
    pub canonical: Option<Url>,

    /// All links found on the page (absolute URLs)
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
///
/// # Example
///
/// ```
/// use crawl_orchestra::extract::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let canonical = first_attr(&document, "link[rel='canonical'][href]", "href")
        .and_then(|href| resolve_link(&href, base_url));

    let mut links = extract_links(&document, base_url);
    if let Some(canonical) = &canonical {
        links.push(canonical.clone());
    }

    ParsedPage {
        title: extract_title(&document),
        description: first_attr(&document, "meta[name='description'][content]", "content")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        canonical,
        links,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr).map(|v| v.to_string()))
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect()
}

/// Resolves a link href to an absolute http(s) URL
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        }
        // no header: sniff
        None => true,
    }
}

/// Title/meta/link extraction for any site without a custom handler
///
/// Non-HTML responses (feeds, JSON, images) produce a record describing the
/// payload and no links.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn parse(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
        page_url: &Url,
        site: &SiteConfig,
    ) -> Result<Extraction, ExtractError> {
        if !is_html(content_type) {
            return Ok(Extraction {
                record: json!({
                    "site": site.name,
                    "url": page_url.as_str(),
                    "content_type": content_type,
                    "bytes": raw.len(),
                }),
                links: Vec::new(),
            });
        }

        let html = std::str::from_utf8(raw)
            .map_err(|e| ExtractError::Malformed(format!("body is not valid UTF-8: {}", e)))?;

        let parsed = parse_html(html, page_url);

        Ok(Extraction {
            record: json!({
                "site": site.name,
                "url": page_url.as_str(),
                "title": parsed.title,
                "description": parsed.description,
                "canonical": parsed.canonical.as_ref().map(Url::as_str),
                "link_count": parsed.links.len(),
            }),
            links: parsed.links,
        })
    }
}
