use crate::config::SiteConfig;
use crate::extract::Extractor;
use crate::fetch::{FetchError, FetchExecutor, FetchRequest, FetchResult, RenderEngine, RenderMode};
use crate::output::{FailureKind, SessionReport};
use crate::politeness::RobotsVerdict;
use crate::session::SessionState;
use crate::storage::{Artifact, PartitionedStore, ProcessedRecord, PutOutcome, StoreError};
use crate::url::{normalize, same_origin};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Crawl of one site
///
/// Owns the site's frontier and visited set and drives them sequentially:
/// every URL is checked against robots.txt, fetched through the executor,
/// stored, and handed to the extractor for link discovery.
pub struct CrawlSession {
    site: SiteConfig,
    state: SessionState,
    frontier: VecDeque<Url>,
    visited: HashSet<Url>,
    queued: HashSet<Url>,
    report: SessionReport,
    executor: FetchExecutor,
    store: PartitionedStore,
    extractor: Arc<dyn Extractor>,
    render_engine: Arc<dyn RenderEngine>,
    cancel: CancellationToken,
    abort_on_storage_failure: bool,
}

/// Why the crawl loop stopped
enum Stop {
    Completed,
    Aborted(String),
}

impl CrawlSession {
    /// Creates a pending session with the site's entry URLs in the frontier
    pub fn new(
        site: SiteConfig,
        executor: FetchExecutor,
        store: PartitionedStore,
        extractor: Arc<dyn Extractor>,
        render_engine: Arc<dyn RenderEngine>,
        cancel: CancellationToken,
    ) -> Self {
        let report = SessionReport::new(site.name.clone(), site.mode);
        let mut session = Self {
            site,
            state: SessionState::Pending,
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            queued: HashSet::new(),
            report,
            executor,
            store,
            extractor,
            render_engine,
            cancel,
            abort_on_storage_failure: false,
        };

        for entry in session.site.entry_urls() {
            match normalize(entry.clone()) {
                Ok(url) => session.enqueue(url),
                Err(e) => warn!(site = %session.site.name, url = %entry, error = %e, "Skipping invalid entry URL"),
            }
        }

        session
    }

    /// Abort the session when the store rejects an artifact
    pub fn with_abort_on_storage_failure(mut self, abort: bool) -> Self {
        self.abort_on_storage_failure = abort;
        self
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    fn enqueue(&mut self, url: Url) {
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return;
        }
        self.queued.insert(url.clone());
        self.frontier.push_back(url);
    }

    fn set_state(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(state) => {
                self.state = state;
                self.report.state = state;
            }
            Err(e) => error!(site = %self.site.name, error = %e, "Rejected session transition"),
        }
    }

    fn finish(mut self, stop: Stop) -> SessionReport {
        match stop {
            Stop::Completed => {
                self.set_state(SessionState::Completed);
                info!(
                    site = %self.site.name,
                    pages = self.report.pages_fetched,
                    stored = self.report.artifacts_stored,
                    deduplicated = self.report.artifacts_deduplicated,
                    failures = self.report.total_failures(),
                    policy_skips = self.report.policy_skips,
                    "Session completed"
                );
            }
            Stop::Aborted(reason) => {
                self.set_state(SessionState::Aborted);
                error!(
                    site = %self.site.name,
                    pages = self.report.pages_fetched,
                    reason = %reason,
                    "Session aborted"
                );
                self.report.abort_reason = Some(reason);
            }
        }

        self.report.finished_at = Some(Utc::now());
        self.report
    }

    /// Runs the session to a terminal state and returns its report
    pub async fn run(mut self) -> SessionReport {
        info!(
            site = %self.site.name,
            mode = ?self.site.mode,
            page_limit = self.site.page_limit,
            "Session starting"
        );

        if self.cancel.is_cancelled() {
            return self.finish(Stop::Aborted("cancelled before start".to_string()));
        }

        let executor = match self.site.mode {
            RenderMode::Static => self.executor.clone(),
            RenderMode::Dynamic => {
                let launched = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
                    launched = self.render_engine.launch(&self.site) => launched,
                };
                match launched {
                    Ok(transport) => self.executor.clone().with_dynamic(transport),
                    Err(e) => {
                        return self.finish(Stop::Aborted(format!(
                            "render engine unavailable: {}",
                            e
                        )))
                    }
                }
            }
        };

        let verdict = executor.gate().prime(&self.site, &self.site.url).await;
        if verdict == RobotsVerdict::SiteDisallowed {
            return self.finish(Stop::Aborted(
                "robots.txt disallows the site entry URL".to_string(),
            ));
        }

        self.set_state(SessionState::Running);
        let stop = self.crawl(&executor).await;
        self.finish(stop)
    }

    async fn crawl(&mut self, executor: &FetchExecutor) -> Stop {
        loop {
            if self.cancel.is_cancelled() {
                return Stop::Aborted("cancelled".to_string());
            }

            if self.report.pages_fetched >= self.site.page_limit {
                debug!(site = %self.site.name, "Page limit reached");
                return Stop::Completed;
            }

            let Some(url) = self.frontier.pop_front() else {
                debug!(site = %self.site.name, "Frontier exhausted");
                return Stop::Completed;
            };
            self.queued.remove(&url);

            if self.visited.contains(&url) {
                continue;
            }

            if !executor.gate().is_allowed(&self.site, &url) {
                debug!(site = %self.site.name, url = %url, "Disallowed by robots.txt");
                self.visited.insert(url.clone());
                self.report
                    .record(FailureKind::PolicySkip, url.as_str(), "disallowed by robots.txt", None);
                continue;
            }

            self.visited.insert(url.clone());

            let request = FetchRequest::new(url.clone(), self.site.mode);
            match executor.execute(&self.site, request).await {
                FetchResult::Success {
                    body,
                    content_type,
                    status,
                    fetched_at,
                    final_url,
                } => {
                    if let Err(reason) = self
                        .handle_page(url, body, content_type, status, fetched_at, final_url)
                        .await
                    {
                        return Stop::Aborted(reason);
                    }
                }
                FetchResult::PermanentFailure {
                    reason: FetchError::Cancelled,
                } => {
                    return Stop::Aborted("cancelled".to_string());
                }
                FetchResult::PermanentFailure { reason } => {
                    debug!(site = %self.site.name, url = %url, error = %reason, "Permanent failure");
                    let render_failed = matches!(reason, FetchError::RenderEngine(_));
                    self.report
                        .record(FailureKind::Permanent, url.as_str(), reason.to_string(), Some(1));
                    if render_failed {
                        return Stop::Aborted(format!("render engine failed: {}", reason));
                    }
                }
                FetchResult::TransientFailure { reason, attempts } => {
                    warn!(
                        site = %self.site.name,
                        url = %url,
                        attempts,
                        error = %reason,
                        "Giving up on URL after transient failures"
                    );
                    self.report.record(
                        FailureKind::Transient,
                        url.as_str(),
                        reason.to_string(),
                        Some(attempts),
                    );
                }
            }
        }
    }

    /// Stores a fetched page and its extraction record, and queues its links
    ///
    /// A redirect onto a page this session already visited is dropped without
    /// counting. Returns `Err(reason)` only when a storage failure must abort
    /// the session.
    async fn handle_page(
        &mut self,
        url: Url,
        body: Vec<u8>,
        content_type: Option<String>,
        status: u16,
        fetched_at: DateTime<Utc>,
        final_url: Url,
    ) -> Result<(), String> {
        if final_url != url {
            if let Ok(landed) = normalize(final_url.clone()) {
                if landed != url && !self.visited.insert(landed) {
                    debug!(
                        site = %self.site.name,
                        url = %url,
                        final_url = %final_url,
                        "Redirected to an already visited page"
                    );
                    return Ok(());
                }
            }
        }

        self.report.pages_fetched += 1;

        let artifact = Artifact::new(
            self.site.name.clone(),
            final_url.clone(),
            fetched_at,
            content_type.clone(),
            status,
            body,
        );

        match self.store.put(&artifact).await {
            Ok(PutOutcome::Stored { .. }) => self.report.artifacts_stored += 1,
            Ok(PutOutcome::AlreadyPresent { key }) => {
                debug!(site = %self.site.name, key = %key, "Identical artifact already stored");
                self.report.artifacts_deduplicated += 1;
            }
            Err(e) => self.storage_failed(&url, "artifact", &e)?,
        }

        match self.extractor.parse(
            &artifact.payload,
            content_type.as_deref(),
            &final_url,
            &self.site,
        ) {
            Ok(extraction) => {
                if !extraction.record.is_null() {
                    let record = ProcessedRecord::from_artifact(&artifact, extraction.record);
                    match self.store.put_processed(&record).await {
                        Ok(PutOutcome::Stored { .. }) => self.report.records_stored += 1,
                        Ok(PutOutcome::AlreadyPresent { .. }) => {}
                        Err(e) => self.storage_failed(&url, "record", &e)?,
                    }
                }

                if self.site.follow_links {
                    let before = self.frontier.len();
                    for link in extraction.links {
                        let Ok(link) = normalize(link) else {
                            continue;
                        };
                        if same_origin(&self.site.url, &link) {
                            self.enqueue(link);
                        }
                    }
                    debug!(
                        site = %self.site.name,
                        url = %url,
                        queued = self.frontier.len() - before,
                        "Links discovered"
                    );
                }
            }
            Err(e) => {
                warn!(site = %self.site.name, url = %url, error = %e, "Extraction failed");
                self.report
                    .record(FailureKind::Extraction, url.as_str(), e.to_string(), None);
            }
        }

        Ok(())
    }

    fn storage_failed(
        &mut self,
        url: &Url,
        what: &str,
        error: &StoreError,
    ) -> Result<(), String> {
        error!(site = %self.site.name, url = %url, error = %error, "Failed to store {}", what);
        self.report
            .record(FailureKind::Storage, url.as_str(), error.to_string(), None);
        if self.abort_on_storage_failure {
            return Err(format!("storage failure: {}", error));
        }
        Ok(())
    }
}
