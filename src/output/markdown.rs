//! Markdown summary generation
//!
//! Renders a [`RunReport`] as a human-readable markdown page: run metadata,
//! a per-site table and the first recorded failures of each session.

use crate::output::traits::{OutputHandler, OutputResult};
use crate::output::{FailureKind, RunReport};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Failure lines listed per site in the summary
const FAILURES_PER_SITE: usize = 10;

/// Writes the markdown summary of the last run to a fixed path
#[derive(Debug, Clone)]
pub struct MarkdownSummary {
    path: PathBuf,
}

impl MarkdownSummary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputHandler for MarkdownSummary {
    fn write_report(&self, report: &RunReport) -> OutputResult<PathBuf> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&self.path)?;
        file.write_all(format_markdown_summary(report).as_bytes())?;

        Ok(self.path.clone())
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Transient => "transient",
        FailureKind::Permanent => "permanent",
        FailureKind::PolicySkip => "policy skip",
        FailureKind::Storage => "storage",
        FailureKind::Extraction => "extraction",
    }
}

/// Formats a run report as markdown
pub fn format_markdown_summary(report: &RunReport) -> String {
    let mut md = String::new();

    md.push_str("# Crawl Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        report.duration_seconds()
    ));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    if report.cancelled {
        md.push_str("- **Cancelled**: yes\n");
    }
    md.push('\n');

    let totals = &report.totals;
    md.push_str("## Totals\n\n");
    md.push_str(&format!("- **Sites Attempted**: {}\n", totals.sites_attempted));
    md.push_str(&format!("- **Sites Completed**: {}\n", totals.sites_completed));
    md.push_str(&format!("- **Sites Aborted**: {}\n", totals.sites_aborted));
    md.push_str(&format!("- **Pages Fetched**: {}\n", totals.total_pages));
    md.push_str(&format!("- **Artifacts Stored**: {}\n", totals.artifacts_stored));
    md.push_str(&format!("- **Failures**: {}\n", totals.total_failures));
    md.push_str(&format!("- **Policy Skips**: {}\n\n", totals.total_policy_skips));

    md.push_str("## Sites\n\n");
    md.push_str("| Site | Mode | State | Pages | Stored | Deduplicated | Records | Failures | Policy Skips |\n");
    md.push_str("|------|------|-------|-------|--------|--------------|---------|----------|--------------|\n");
    for session in &report.sessions {
        md.push_str(&format!(
            "| {} | {:?} | {} | {} | {} | {} | {} | {} | {} |\n",
            session.site,
            session.mode,
            session.state,
            session.pages_fetched,
            session.artifacts_stored,
            session.artifacts_deduplicated,
            session.records_stored,
            session.total_failures(),
            session.policy_skips
        ));
    }
    md.push('\n');

    let aborted: Vec<_> = report
        .sessions
        .iter()
        .filter_map(|s| s.abort_reason.as_ref().map(|reason| (&s.site, reason)))
        .collect();
    if !aborted.is_empty() {
        md.push_str("## Aborted Sessions\n\n");
        for (site, reason) in aborted {
            md.push_str(&format!("- **{}**: {}\n", site, reason));
        }
        md.push('\n');
    }

    if report.sessions.iter().any(|s| !s.failures.is_empty()) {
        md.push_str("## Failures\n\n");
        for session in report.sessions.iter().filter(|s| !s.failures.is_empty()) {
            md.push_str(&format!("### {}\n\n", session.site));
            md.push_str("| Kind | URL | Reason |\n");
            md.push_str("|------|-----|--------|\n");
            for failure in session.failures.iter().take(FAILURES_PER_SITE) {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    kind_label(failure.kind),
                    failure.url,
                    failure.reason
                ));
            }
            if session.failures.len() > FAILURES_PER_SITE {
                md.push_str(&format!(
                    "\n... and {} more\n",
                    session.failures.len() - FAILURES_PER_SITE
                ));
            }
            md.push('\n');
        }
    }

    if !report.unknown_sites.is_empty() {
        md.push_str("## Unknown Sites\n\n");
        for name in &report.unknown_sites {
            md.push_str(&format!("- {}\n", name));
        }
        md.push('\n');
    }

    md
}
