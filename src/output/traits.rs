//! Output handler traits and types
//!
//! Handlers persist a finished [`RunReport`] somewhere an operator can read it.

use crate::output::RunReport;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Trait for output handlers
pub trait OutputHandler {
    /// Writes the report and returns where it landed
    fn write_report(&self, report: &RunReport) -> OutputResult<PathBuf>;
}
