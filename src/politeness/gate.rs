use crate::config::{CrawlerConfig, SiteConfig};
use crate::politeness::SiteState;
use crate::robots::{PolitenessPolicy, RobotsFetch, RobotsRules, RobotsSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// The gate wait was interrupted by the global cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Politeness wait cancelled")]
pub struct Cancelled;

/// Result of the first robots.txt load for a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsVerdict {
    /// Rules were loaded and the entry URL may be fetched
    Allowed,
    /// The entry URL itself is disallowed
    SiteDisallowed,
    /// robots.txt could not be fetched; everything is allowed
    Unavailable,
}

/// Proof that the caller may start one fetch
///
/// Holds one of the site's concurrency tokens until dropped.
#[derive(Debug)]
pub struct Permit {
    _token: OwnedSemaphorePermit,
    site: String,
}

impl Permit {
    /// Name of the site the permit was granted for
    pub fn site(&self) -> &str {
        &self.site
    }
}

/// Per-site rate limiting and robots state
struct SiteSlot {
    robots_url: Option<Url>,
    min_delay: Duration,
    watermark: tokio::sync::Mutex<SiteState>,
    tokens: Arc<Semaphore>,
    policy: RwLock<Option<PolitenessPolicy>>,
    refreshing: AtomicBool,
}

impl SiteSlot {
    fn new(site: &SiteConfig) -> Self {
        let robots_url = crate::url::robots_url(&site.url);

        let foreign = foreign_entry_origins(site);
        if !foreign.is_empty() {
            debug!(
                site = %site.name,
                robots_url = ?robots_url.as_ref().map(Url::as_str),
                origins = ?foreign,
                "Entry URLs on other origins follow this site's robots.txt"
            );
        }

        Self {
            robots_url,
            min_delay: site.min_delay,
            watermark: tokio::sync::Mutex::new(SiteState::new()),
            tokens: Arc::new(Semaphore::new(site.max_concurrent_requests.max(1) as usize)),
            policy: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    fn policy(&self) -> Option<PolitenessPolicy> {
        self.policy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stores the outcome of a robots.txt fetch
    ///
    /// An unavailable file keeps the previous rules (or allows everything when
    /// none were ever loaded) until the next TTL check.
    fn store(&self, fetch: RobotsFetch, ttl: Duration) -> Option<RobotsRules> {
        let chrono_ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));
        let mut guard = self
            .policy
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match fetch.into_rules() {
            Some(rules) => {
                *guard = Some(PolitenessPolicy::new(rules.clone(), chrono_ttl));
                Some(rules)
            }
            None => {
                let previous = guard
                    .take()
                    .map(|p| p.rules)
                    .unwrap_or_else(RobotsRules::allow_all);
                *guard = Some(PolitenessPolicy::new(previous, chrono_ttl));
                None
            }
        }
    }

    fn effective_delay(&self, user_agent: &str) -> Duration {
        let crawl_delay = self
            .policy()
            .and_then(|p| p.crawl_delay(user_agent))
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO);
        self.min_delay.max(crawl_delay)
    }
}

/// Origins of a site's entry URLs that differ from its base URL's origin
fn foreign_entry_origins(site: &SiteConfig) -> Vec<String> {
    let base = site.url.origin();
    let mut origins: Vec<String> = Vec::new();
    for url in site.entry_urls() {
        let origin = url.origin();
        if origin != base {
            let serialized = origin.ascii_serialization();
            if !origins.contains(&serialized) {
                origins.push(serialized);
            }
        }
    }
    origins
}

/// Per-site rate limiter and robots.txt policy cache
///
/// One gate is shared by every session of a run. Each site gets a
/// next-eligible-time watermark serialized by an async mutex, plus a
/// semaphore bounding in-flight fetches.
pub struct PolitenessGate {
    sites: Mutex<HashMap<String, Arc<SiteSlot>>>,
    source: Arc<dyn RobotsSource>,
    user_agent: String,
    robots_ttl: Duration,
    robots_timeout: Duration,
    cancel: CancellationToken,
}

impl PolitenessGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `source` - Where robots.txt files are fetched from
    /// * `user_agent` - Product token matched against robots.txt groups
    /// * `cancel` - Global cancellation token interrupting every wait
    pub fn new(
        source: Arc<dyn RobotsSource>,
        user_agent: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let defaults = CrawlerConfig::default();
        Self {
            sites: Mutex::new(HashMap::new()),
            source,
            user_agent: user_agent.into(),
            robots_ttl: Duration::from_secs(defaults.robots_ttl_secs),
            robots_timeout: Duration::from_millis(defaults.robots_timeout_ms),
            cancel,
        }
    }

    /// Creates a gate with the robots TTL and timeout from the crawler config
    pub fn from_config(
        config: &CrawlerConfig,
        source: Arc<dyn RobotsSource>,
        user_agent: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(source, user_agent, cancel)
            .with_robots_ttl(Duration::from_secs(config.robots_ttl_secs))
            .with_robots_timeout(Duration::from_millis(config.robots_timeout_ms))
    }

    pub fn with_robots_ttl(mut self, ttl: Duration) -> Self {
        self.robots_ttl = ttl;
        self
    }

    pub fn with_robots_timeout(mut self, timeout: Duration) -> Self {
        self.robots_timeout = timeout;
        self
    }

    fn slot(&self, site: &SiteConfig) -> Arc<SiteSlot> {
        let mut sites = self
            .sites
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sites
            .entry(site.name.clone())
            .or_insert_with(|| Arc::new(SiteSlot::new(site)))
            .clone()
    }

    /// Waits until the site may receive another fetch
    ///
    /// Returns immediately when the effective delay has elapsed since the last
    /// granted fetch, otherwise sleeps until it has. The returned permit holds
    /// one of the site's concurrency tokens.
    pub async fn acquire(&self, site: &SiteConfig) -> Result<Permit, Cancelled> {
        let slot = self.slot(site);

        let token = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled),
            token = slot.tokens.clone().acquire_owned() => token.map_err(|_| Cancelled)?,
        };

        let delay = slot.effective_delay(&self.user_agent);

        let mut watermark = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled),
            guard = slot.watermark.lock() => guard,
        };

        if let Some(wait) = watermark.time_until_next_request(Instant::now()) {
            debug!(site = %site.name, wait_ms = wait.as_millis() as u64, "Waiting for politeness delay");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        watermark.record_request(Instant::now(), delay);

        Ok(Permit {
            _token: token,
            site: site.name.clone(),
        })
    }

    /// Checks the cached robots policy for a URL
    ///
    /// When nothing is cached or the cached policy is stale, a background
    /// refresh is started (one per site at a time) and the previous decision
    /// is served; with nothing cached at all the URL is allowed.
    pub fn is_allowed(&self, site: &SiteConfig, url: &Url) -> bool {
        let slot = self.slot(site);
        let policy = slot.policy();

        let needs_refresh = policy.as_ref().map(|p| p.is_stale()).unwrap_or(true);
        if needs_refresh {
            self.spawn_refresh(&site.name, slot);
        }

        policy
            .map(|p| p.is_allowed(url.as_str(), &self.user_agent))
            .unwrap_or(true)
    }

    fn spawn_refresh(&self, site_name: &str, slot: Arc<SiteSlot>) {
        let Some(robots_url) = slot.robots_url.clone() else {
            return;
        };

        if slot
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let source = self.source.clone();
        let ttl = self.robots_ttl;
        let timeout = self.robots_timeout;
        let site_name = site_name.to_string();

        tokio::spawn(async move {
            let fetch = fetch_with_timeout(source.as_ref(), &robots_url, timeout).await;
            if let RobotsFetch::Unavailable(reason) = &fetch {
                warn!(site = %site_name, %reason, "robots.txt refresh failed, keeping previous rules");
            } else {
                debug!(site = %site_name, "robots.txt refreshed");
            }
            slot.store(fetch, ttl);
            slot.refreshing.store(false, Ordering::Release);
        });
    }

    /// Loads robots.txt for a site before its first fetch
    ///
    /// Bounded by the robots timeout. The verdict tells the session whether
    /// the entry URL itself may be crawled.
    pub async fn prime(&self, site: &SiteConfig, entry_url: &Url) -> RobotsVerdict {
        let slot = self.slot(site);
        let Some(robots_url) = slot.robots_url.clone() else {
            return RobotsVerdict::Unavailable;
        };

        let fetch = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => RobotsFetch::Unavailable("cancelled".to_string()),
            fetch = fetch_with_timeout(self.source.as_ref(), &robots_url, self.robots_timeout) => fetch,
        };

        match slot.store(fetch, self.robots_ttl) {
            Some(rules) => {
                if let Some(delay) = rules.crawl_delay(&self.user_agent) {
                    info!(site = %site.name, crawl_delay_secs = delay, "robots.txt sets a crawl delay");
                }
                if let Some(policy) = slot.policy() {
                    debug!(
                        site = %site.name,
                        disallowed = ?policy.disallowed_prefixes(&self.user_agent),
                        "robots.txt rules loaded"
                    );
                }
                if rules.is_allowed(entry_url.as_str(), &self.user_agent) {
                    RobotsVerdict::Allowed
                } else {
                    RobotsVerdict::SiteDisallowed
                }
            }
            None => {
                warn!(site = %site.name, url = %robots_url, "robots.txt unavailable, allowing all paths");
                RobotsVerdict::Unavailable
            }
        }
    }

    /// Returns the cached robots policy for a site, if any
    pub fn policy(&self, site_name: &str) -> Option<PolitenessPolicy> {
        let sites = self
            .sites
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sites.get(site_name).and_then(|slot| slot.policy())
    }

    /// Product token used for robots.txt matching
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

async fn fetch_with_timeout(
    source: &dyn RobotsSource,
    robots_url: &Url,
    timeout: Duration,
) -> RobotsFetch {
    match tokio::time::timeout(timeout, source.fetch_robots(robots_url)).await {
        Ok(fetch) => fetch,
        Err(_) => RobotsFetch::Unavailable(format!("timed out after {:?}", timeout)),
    }
}
