use crate::config::SiteConfig;
use crate::fetch::{FetchError, Transport};
use async_trait::async_trait;
use std::sync::Arc;

/// Launches the dynamic rendering transport for a site
///
/// Called once per dynamic session before its first fetch. A launch failure
/// aborts that session only.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn launch(&self, site: &SiteConfig) -> Result<Arc<dyn Transport>, FetchError>;
}

/// Engine used when no browser support is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngine;

#[async_trait]
impl RenderEngine for UnavailableEngine {
    async fn launch(&self, _site: &SiteConfig) -> Result<Arc<dyn Transport>, FetchError> {
        Err(FetchError::RenderEngine(
            "no dynamic render engine available (build with the `headless` feature)".to_string(),
        ))
    }
}

/// Reads the HTTP status of the document's navigation entry
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
const NAVIGATION_STATUS_SCRIPT: &str =
    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0";

/// Step of a browser fetch that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
pub(crate) enum RenderStage {
    /// Opening or configuring a tab
    Tab,
    /// Loading the page
    Navigation,
    /// Reading the rendered document
    Content,
}

/// Messages that mean the browser process itself is gone
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
const DEAD_BROWSER_MARKERS: &[&str] = &[
    "connection is closed",
    "browser closed",
    "browser has been closed",
    "target closed",
    "channel closed",
];

/// Classifies a browser error by where it happened
///
/// Only a dead browser or a tab that cannot be opened is a render engine
/// failure. Page-level problems are timeouts or connection errors and are
/// retried like their static counterparts.
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
pub(crate) fn classify_render_error(stage: RenderStage, message: &str) -> FetchError {
    let lower = message.to_lowercase();

    if stage == RenderStage::Tab || DEAD_BROWSER_MARKERS.iter().any(|m| lower.contains(m)) {
        return FetchError::RenderEngine(message.to_string());
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        FetchError::Timeout
    } else {
        FetchError::Connection(message.to_string())
    }
}

/// Turns the status reported by the page into a fetch outcome
///
/// Pages that report nothing (or nonsense) count as 200.
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
pub(crate) fn rendered_status(reported: Option<u64>) -> Result<u16, FetchError> {
    let status = reported
        .filter(|s| (100..=599).contains(s))
        .map(|s| s as u16)
        .unwrap_or(200);

    if (200..300).contains(&status) {
        Ok(status)
    } else {
        Err(FetchError::from_status(status, None))
    }
}

#[cfg(feature = "headless")]
pub use headless::HeadlessChromeEngine;

#[cfg(feature = "headless")]
mod headless {
    use super::*;
    use crate::fetch::FetchedPage;
    use headless_chrome::{Browser, LaunchOptions};
    use std::time::Duration;
    use tracing::{debug, info};
    use url::Url;

    /// Renders pages in a headless Chrome instance
    #[derive(Debug, Clone)]
    pub struct HeadlessChromeEngine {
        user_agent: String,
    }

    impl HeadlessChromeEngine {
        pub fn new(user_agent: impl Into<String>) -> Self {
            Self {
                user_agent: user_agent.into(),
            }
        }
    }

    #[async_trait]
    impl RenderEngine for HeadlessChromeEngine {
        async fn launch(&self, site: &SiteConfig) -> Result<Arc<dyn Transport>, FetchError> {
            let browser = tokio::task::spawn_blocking(|| {
                let options = LaunchOptions::default_builder()
                    .headless(true)
                    .window_size(Some((1920, 1080)))
                    .build()
                    .map_err(|e| FetchError::RenderEngine(e.to_string()))?;
                Browser::new(options).map_err(|e| FetchError::RenderEngine(e.to_string()))
            })
            .await
            .map_err(|e| FetchError::RenderEngine(e.to_string()))??;

            info!(site = %site.name, "Headless browser launched");

            Ok(Arc::new(BrowserTransport {
                browser,
                user_agent: self.user_agent.clone(),
                render_wait: site.render_wait,
            }))
        }
    }

    struct BrowserTransport {
        browser: Browser,
        user_agent: String,
        render_wait: Duration,
    }

    /// Maps a failed browser call at `stage` to a fetch error
    fn failed<E: std::fmt::Display>(stage: RenderStage) -> impl Fn(E) -> FetchError {
        move |e: E| classify_render_error(stage, &e.to_string())
    }

    #[async_trait]
    impl Transport for BrowserTransport {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            let browser = self.browser.clone();
            let user_agent = self.user_agent.clone();
            let render_wait = self.render_wait;
            let target = url.clone();

            tokio::task::spawn_blocking(move || -> Result<FetchedPage, FetchError> {
                let tab = browser.new_tab().map_err(failed(RenderStage::Tab))?;
                tab.set_user_agent(&user_agent, None, None)
                    .map_err(failed(RenderStage::Tab))?;
                tab.navigate_to(target.as_str())
                    .map_err(failed(RenderStage::Navigation))?
                    .wait_until_navigated()
                    .map_err(failed(RenderStage::Navigation))?;

                debug!(url = %target, wait_ms = render_wait.as_millis() as u64, "Waiting for render");
                std::thread::sleep(render_wait);

                let reported = tab
                    .evaluate(NAVIGATION_STATUS_SCRIPT, false)
                    .ok()
                    .and_then(|object| object.value)
                    .and_then(|value| value.as_u64());
                let content = tab.get_content().map_err(failed(RenderStage::Content));
                let final_url = Url::parse(&tab.get_url()).unwrap_or(target);
                let _ = tab.close(true);

                let status = rendered_status(reported)?;
                Ok(FetchedPage {
                    body: content?.into_bytes(),
                    content_type: Some("text/html; charset=utf-8".to_string()),
                    status,
                    final_url,
                })
            })
            .await
            .map_err(|e| FetchError::RenderEngine(format!("browser task failed: {}", e)))?
        }
    }
}
