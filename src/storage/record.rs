use crate::storage::{processed_key, Artifact, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Structured output of one extraction
///
/// Shares source, day and content hash with the artifact it came from, so a
/// page stored twice on one day yields a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub source: String,
    pub source_url: String,
    pub logical_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub extracted_at: DateTime<Utc>,
    pub content_hash: String,
    pub record: serde_json::Value,
}

impl ProcessedRecord {
    pub fn from_artifact(artifact: &Artifact, record: serde_json::Value) -> Self {
        Self {
            source: artifact.source.clone(),
            source_url: artifact.source_url.to_string(),
            logical_date: artifact.logical_date,
            fetched_at: artifact.fetched_at,
            extracted_at: Utc::now(),
            content_hash: artifact.content_hash.clone(),
            record,
        }
    }

    /// Key this record is stored under
    pub fn storage_key(&self) -> StoreResult<String> {
        processed_key(&self.source, self.logical_date, &self.content_hash)
    }
}
