//! JSON results file
//!
//! Every run drops a `crawl_results_<timestamp>.json` into the results
//! directory. Earlier files are never touched.

use crate::output::traits::{OutputError, OutputHandler, OutputResult};
use crate::output::RunReport;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::Builder;

/// Writes run reports as pretty-printed JSON files
#[derive(Debug, Clone)]
pub struct JsonResultsWriter {
    dir: PathBuf,
}

impl JsonResultsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a report, derived from its start time
    pub fn file_name(report: &RunReport) -> String {
        format!(
            "crawl_results_{}.json",
            report.started_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl OutputHandler for JsonResultsWriter {
    fn write_report(&self, report: &RunReport) -> OutputResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(Self::file_name(report));
        let mut file = Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, report)?;
        file.write_all(b"\n")?;

        file.persist(&path)
            .map_err(|e| OutputError::Write(format!("{}: {}", path.display(), e)))?;

        Ok(path)
    }
}
