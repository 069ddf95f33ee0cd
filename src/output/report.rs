//! Run and session reports
//!
//! Sessions fill in a [`SessionReport`] as they go; the dispatcher collects
//! them into a [`RunReport`] once every session has finished.

use crate::fetch::RenderMode;
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Failure records kept per session; counters keep counting past this
pub const MAX_FAILURE_RECORDS: usize = 100;

/// What a failure record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retries exhausted on a transient error
    Transient,
    /// Non-retryable fetch error
    Permanent,
    /// robots.txt disallowed the URL; not counted as a failure
    PolicySkip,
    /// The object store rejected the artifact
    Storage,
    /// The extraction collaborator failed; the artifact was still stored
    Extraction,
}

impl FailureKind {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::PolicySkip)
    }
}

/// One URL that did not end as a stored, parsed page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub url: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// Outcome of one site's crawl session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub site: String,
    pub mode: RenderMode,
    pub state: SessionState,
    pub pages_fetched: u32,
    pub artifacts_stored: u32,
    pub artifacts_deduplicated: u32,
    /// Extraction records written to the processed zone
    pub records_stored: u32,
    pub transient_failures: u32,
    pub permanent_failures: u32,
    pub policy_skips: u32,
    pub storage_failures: u32,
    pub extraction_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub failures: Vec<FailureRecord>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionReport {
    pub fn new(site: impl Into<String>, mode: RenderMode) -> Self {
        Self {
            site: site.into(),
            mode,
            state: SessionState::Pending,
            pages_fetched: 0,
            artifacts_stored: 0,
            artifacts_deduplicated: 0,
            records_stored: 0,
            transient_failures: 0,
            permanent_failures: 0,
            policy_skips: 0,
            storage_failures: 0,
            extraction_failures: 0,
            abort_reason: None,
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Report for a session that never got to run
    pub fn aborted(site: impl Into<String>, mode: RenderMode, reason: impl Into<String>) -> Self {
        let mut report = Self::new(site, mode);
        report.state = SessionState::Aborted;
        report.abort_reason = Some(reason.into());
        report.finished_at = Some(Utc::now());
        report
    }

    /// Counts a record of `kind` and keeps it if there is room
    pub fn record(
        &mut self,
        kind: FailureKind,
        url: impl Into<String>,
        reason: impl Into<String>,
        attempts: Option<u32>,
    ) {
        match kind {
            FailureKind::Transient => self.transient_failures += 1,
            FailureKind::Permanent => self.permanent_failures += 1,
            FailureKind::PolicySkip => self.policy_skips += 1,
            FailureKind::Storage => self.storage_failures += 1,
            FailureKind::Extraction => self.extraction_failures += 1,
        }

        if self.failures.len() < MAX_FAILURE_RECORDS {
            self.failures.push(FailureRecord {
                kind,
                url: url.into(),
                reason: reason.into(),
                attempts,
            });
        }
    }

    /// Fetch failures: transient plus permanent
    pub fn fetch_failures(&self) -> u32 {
        self.transient_failures + self.permanent_failures
    }

    /// Every counted failure; policy skips excluded
    pub fn total_failures(&self) -> u32 {
        self.fetch_failures() + self.storage_failures + self.extraction_failures
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }
}

/// Run-level aggregates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub sites_attempted: u32,
    pub sites_completed: u32,
    pub sites_aborted: u32,
    pub total_pages: u32,
    pub total_failures: u32,
    pub total_policy_skips: u32,
    pub artifacts_stored: u32,
}

impl RunTotals {
    fn from_sessions(sessions: &[SessionReport]) -> Self {
        sessions.iter().fold(Self::default(), |mut totals, session| {
            totals.sites_attempted += 1;
            match session.state {
                SessionState::Completed => totals.sites_completed += 1,
                SessionState::Aborted => totals.sites_aborted += 1,
                _ => {}
            }
            totals.total_pages += session.pages_fetched;
            totals.total_failures += session.total_failures();
            totals.total_policy_skips += session.policy_skips;
            totals.artifacts_stored += session.artifacts_stored;
            totals
        })
    }
}

/// Outcome of one dispatcher run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub cancelled: bool,
    /// Requested site names that are not configured
    pub unknown_sites: Vec<String>,
    pub totals: RunTotals,
    pub sessions: Vec<SessionReport>,
}

impl RunReport {
    /// Builds the report; sessions are ordered by site name
    pub fn new(
        started_at: DateTime<Utc>,
        mut sessions: Vec<SessionReport>,
        unknown_sites: Vec<String>,
        cancelled: bool,
    ) -> Self {
        sessions.sort_by(|a, b| a.site.cmp(&b.site));
        Self {
            started_at,
            finished_at: Utc::now(),
            config_hash: None,
            cancelled,
            unknown_sites,
            totals: RunTotals::from_sessions(&sessions),
            sessions,
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn session(&self, site: &str) -> Option<&SessionReport> {
        self.sessions.iter().find(|s| s.site == site)
    }

    pub fn has_aborted(&self) -> bool {
        self.totals.sites_aborted > 0
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
