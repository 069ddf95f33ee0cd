//! Output module for run reports
//!
//! This module handles:
//! - Collecting per-session outcomes into a run report
//! - Writing the JSON results file for each run
//! - Generating a markdown summary and console statistics

mod json;
mod markdown;
mod report;
pub mod stats;
mod traits;

pub use json::JsonResultsWriter;
pub use markdown::{format_markdown_summary, MarkdownSummary};
pub use report::{
    FailureKind, FailureRecord, RunReport, RunTotals, SessionReport, MAX_FAILURE_RECORDS,
};
pub use stats::{format_statistics, print_statistics};
pub use traits::{OutputError, OutputHandler, OutputResult};
