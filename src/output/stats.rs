//! Console rendering of a run report

use crate::output::RunReport;

/// Formats the per-site table printed at the end of a run
pub fn format_statistics(report: &RunReport) -> String {
    let width = report
        .sessions
        .iter()
        .map(|s| s.site.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = String::new();
    out.push_str("=== Crawl Statistics ===\n\n");
    out.push_str(&format!(
        "{:<width$}  {:<7}  {:<9}  {:>5}  {:>6}  {:>8}  {:>5}\n",
        "Site",
        "Mode",
        "State",
        "Pages",
        "Stored",
        "Failures",
        "Skips",
        width = width
    ));

    for session in &report.sessions {
        let mode = format!("{:?}", session.mode).to_lowercase();
        out.push_str(&format!(
            "{:<width$}  {:<7}  {:<9}  {:>5}  {:>6}  {:>8}  {:>5}\n",
            session.site,
            mode,
            session.state.as_str(),
            session.pages_fetched,
            session.artifacts_stored,
            session.total_failures(),
            session.policy_skips,
            width = width
        ));
        if let Some(reason) = &session.abort_reason {
            out.push_str(&format!("{:<width$}  -> {}\n", "", reason, width = width));
        }
    }

    let totals = &report.totals;
    out.push_str(&format!(
        "\n{} sites: {} completed, {} aborted; {} pages, {} failures, {} policy skips\n",
        totals.sites_attempted,
        totals.sites_completed,
        totals.sites_aborted,
        totals.total_pages,
        totals.total_failures,
        totals.total_policy_skips
    ));

    if !report.unknown_sites.is_empty() {
        out.push_str(&format!(
            "Unknown sites: {}\n",
            report.unknown_sites.join(", ")
        ));
    }
    if report.cancelled {
        out.push_str("Run was cancelled\n");
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(report: &RunReport) {
    print!("{}", format_statistics(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RenderMode;
    use crate::output::SessionReport;
    use chrono::Utc;

    #[test]
    fn test_format_statistics() {
        let report = RunReport::new(
            Utc::now(),
            vec![SessionReport::aborted("siteB", RenderMode::Dynamic, "render engine unavailable")],
            vec!["ghost".to_string()],
            true,
        );
        let text = format_statistics(&report);

        assert!(text.contains("siteB"));
        assert!(text.contains("dynamic"));
        assert!(text.contains("aborted"));
        assert!(text.contains("-> render engine unavailable"));
        assert!(text.contains("1 sites: 0 completed, 1 aborted"));
        assert!(text.contains("Unknown sites: ghost"));
        assert!(text.contains("Run was cancelled"));
    }
}
