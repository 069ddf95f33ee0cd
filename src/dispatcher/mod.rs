//! Crawler dispatcher
//!
//! Maps the selected site configurations to crawl sessions and runs them
//! concurrently under a global cap, collecting every session's report into
//! one [`RunReport`].

use crate::config::{Config, SiteConfig};
use crate::extract::{Extractor, ExtractorRegistry};
use crate::fetch::{FetchExecutor, HttpTransport, RenderEngine, RetryPolicy, Transport, UnavailableEngine};
use crate::output::{RunReport, SessionReport};
use crate::politeness::PolitenessGate;
use crate::session::CrawlSession;
use crate::storage::PartitionedStore;
use crate::{ConfigError, HarvestError};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Which configured sites a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteFilter {
    All,
    Named(Vec<String>),
}

/// What a run should crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub sites: SiteFilter,
    /// Also crawl the news feeds pseudo-site
    pub news: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self {
            sites: SiteFilter::All,
            news: false,
        }
    }

    pub fn sites<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sites: SiteFilter::Named(names.into_iter().map(Into::into).collect()),
            news: false,
        }
    }

    /// Only the news feeds
    pub fn news_only() -> Self {
        Self {
            sites: SiteFilter::Named(Vec::new()),
            news: true,
        }
    }

    pub fn with_news(mut self, news: bool) -> Self {
        self.news = news;
        self
    }
}

/// Sites a selection resolved to
#[derive(Debug, Clone)]
pub struct Plan {
    pub sites: Vec<SiteConfig>,
    /// Requested names with no matching configuration
    pub unknown: Vec<String>,
}

/// Runs one crawl session per selected site
pub struct Dispatcher {
    executor: FetchExecutor,
    store: PartitionedStore,
    render_engine: Arc<dyn RenderEngine>,
    extractors: ExtractorRegistry,
    news_site: Option<SiteConfig>,
    max_parallel_sessions: usize,
    abort_on_storage_failure: bool,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher around a shared fetch executor
    pub fn new(executor: FetchExecutor, store: PartitionedStore, cancel: CancellationToken) -> Self {
        Self {
            executor,
            store,
            render_engine: Arc::new(UnavailableEngine),
            extractors: ExtractorRegistry::new(),
            news_site: None,
            max_parallel_sessions: 4,
            abort_on_storage_failure: false,
            cancel,
        }
    }

    /// Wires the static transport, politeness gate and retry policy from a config
    pub fn from_config(
        config: &Config,
        store: PartitionedStore,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let transport = Arc::new(HttpTransport::from_config(
            &config.user_agent,
            Duration::from_millis(config.crawler.request_timeout_ms),
        )?);

        let gate = Arc::new(PolitenessGate::from_config(
            &config.crawler,
            transport.clone(),
            config.user_agent.crawler_name.clone(),
            cancel.clone(),
        ));

        let static_transport: Arc<dyn Transport> = transport;
        let executor = FetchExecutor::new(
            gate,
            RetryPolicy::from_config(&config.retry),
            static_transport,
            cancel.clone(),
        );

        Ok(Self::new(executor, store, cancel)
            .with_max_parallel_sessions(config.crawler.max_parallel_sessions as usize)
            .with_abort_on_storage_failure(config.crawler.abort_on_storage_failure)
            .with_news_site(config.news_site()?))
    }

    pub fn with_render_engine(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.render_engine = engine;
        self
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_news_site(mut self, news_site: Option<SiteConfig>) -> Self {
        self.news_site = news_site;
        self
    }

    pub fn with_max_parallel_sessions(mut self, max: usize) -> Self {
        self.max_parallel_sessions = max.max(1);
        self
    }

    pub fn with_abort_on_storage_failure(mut self, abort: bool) -> Self {
        self.abort_on_storage_failure = abort;
        self
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    /// Resolves a selection against the configured sites
    ///
    /// Unknown names are logged and returned in the plan. Selecting nothing
    /// runnable is a configuration error.
    pub fn plan(&self, sites: &[SiteConfig], selection: &Selection) -> Result<Plan, HarvestError> {
        let mut selected = Vec::new();
        let mut unknown = Vec::new();

        match &selection.sites {
            SiteFilter::All => selected.extend(sites.iter().cloned()),
            SiteFilter::Named(names) => {
                let mut seen = HashSet::new();
                for name in names {
                    if !seen.insert(name.as_str()) {
                        continue;
                    }
                    match sites.iter().find(|site| &site.name == name) {
                        Some(site) => selected.push(site.clone()),
                        None => {
                            warn!(site = %name, "Requested site is not configured");
                            unknown.push(name.clone());
                        }
                    }
                }
            }
        }

        if selection.news {
            match &self.news_site {
                Some(news) if !selected.iter().any(|s| s.name == news.name) => {
                    selected.push(news.clone())
                }
                Some(news) => {
                    return Err(ConfigError::Validation(format!(
                        "website '{}' collides with the news feed site",
                        news.name
                    ))
                    .into())
                }
                None => warn!("News crawl requested but no feeds are configured"),
            }
        }

        if selected.is_empty() {
            return Err(ConfigError::NoSitesSelected.into());
        }

        Ok(Plan {
            sites: selected,
            unknown,
        })
    }

    /// Crawls the selected sites and reports on every session
    pub async fn run(
        &self,
        sites: &[SiteConfig],
        selection: &Selection,
    ) -> Result<RunReport, HarvestError> {
        let started_at = Utc::now();
        let plan = self.plan(sites, selection)?;

        let jobs = plan
            .sites
            .into_iter()
            .map(|site| {
                let extractor = self.extractors.resolve(&site)?;
                Ok((site, extractor))
            })
            .collect::<Result<Vec<(SiteConfig, Arc<dyn Extractor>)>, ConfigError>>()?;

        info!(
            sessions = jobs.len(),
            max_parallel = self.max_parallel_sessions,
            "Dispatching crawl sessions"
        );

        let slots = Arc::new(Semaphore::new(self.max_parallel_sessions));
        let mut set = JoinSet::new();

        for (site, extractor) in jobs {
            let name = site.name.clone();
            let mode = site.mode;
            let slots = slots.clone();
            let cancel = self.cancel.clone();
            let session = CrawlSession::new(
                site,
                self.executor.clone(),
                self.store.clone(),
                extractor,
                self.render_engine.clone(),
                self.cancel.clone(),
            )
            .with_abort_on_storage_failure(self.abort_on_storage_failure);

            set.spawn(async move {
                let _slot = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return SessionReport::aborted(name, mode, "cancelled before start");
                    }
                    slot = slots.acquire_owned() => match slot {
                        Ok(slot) => slot,
                        Err(_) => return SessionReport::aborted(name, mode, "session pool closed"),
                    },
                };

                match tokio::spawn(session.run()).await {
                    Ok(report) => report,
                    Err(e) => {
                        let reason = if e.is_panic() {
                            format!("session panicked: {}", panic_message(e.into_panic()))
                        } else {
                            format!("session task failed: {}", e)
                        };
                        error!(site = %name, reason = %reason, "Session ended abnormally");
                        SessionReport::aborted(name, mode, reason)
                    }
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Session supervisor failed"),
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let report = RunReport::new(started_at, reports, plan.unknown, cancelled);

        info!(
            completed = report.totals.sites_completed,
            aborted = report.totals.sites_aborted,
            pages = report.totals.total_pages,
            failures = report.totals.total_failures,
            cancelled,
            "Run finished"
        );

        Ok(report)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
