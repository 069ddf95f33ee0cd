use crate::storage::{StoreError, StoreResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// One fetched page, ready for storage
///
/// Immutable once created. The logical date is the UTC day of `fetched_at`
/// and the content hash is the SHA-256 of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub source: String,
    pub source_url: Url,
    pub logical_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub content_type: Option<String>,
    pub status: u16,
    pub payload: Vec<u8>,
    pub content_hash: String,
}

impl Artifact {
    pub fn new(
        source: impl Into<String>,
        source_url: Url,
        fetched_at: DateTime<Utc>,
        content_type: Option<String>,
        status: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source: source.into(),
            source_url,
            logical_date: fetched_at.date_naive(),
            fetched_at,
            content_type,
            status,
            content_hash: content_hash(&payload),
            payload,
        }
    }

    /// Key this artifact is stored under
    pub fn storage_key(&self) -> StoreResult<String> {
        storage_key(&self.source, self.logical_date, &self.content_hash)
    }
}

/// Outcome of an idempotent put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { key: String },
    AlreadyPresent { key: String },
}

impl PutOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Stored { key } | Self::AlreadyPresent { key } => key,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// SHA-256 hex digest of a payload
pub fn content_hash(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Zone holding fetched artifacts
pub const RAW_ZONE: &str = "raw";

/// Zone holding extraction records
pub const PROCESSED_ZONE: &str = "processed";

fn zone_prefix(zone: &str, source: &str, date: NaiveDate) -> StoreResult<String> {
    if source.is_empty() || source.contains('/') || source == "." || source == ".." {
        return Err(StoreError::InvalidKey(format!(
            "invalid source name '{}'",
            source
        )));
    }
    Ok(format!(
        "{}/{}/{:04}/{:02}/{:02}/",
        zone,
        source,
        date.year(),
        date.month(),
        date.day()
    ))
}

fn zone_key(zone: &str, source: &str, date: NaiveDate, content_hash: &str) -> StoreResult<String> {
    if content_hash.is_empty() || !content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StoreError::InvalidKey(format!(
            "invalid content hash '{}'",
            content_hash
        )));
    }
    Ok(format!(
        "{}{}.json.gz",
        zone_prefix(zone, source, date)?,
        content_hash
    ))
}

/// Key prefix for one source and day: `raw/{source}/{yyyy}/{mm}/{dd}/`
pub fn partition_prefix(source: &str, date: NaiveDate) -> StoreResult<String> {
    zone_prefix(RAW_ZONE, source, date)
}

/// Full key: `raw/{source}/{yyyy}/{mm}/{dd}/{content_hash}.json.gz`
pub fn storage_key(source: &str, date: NaiveDate, content_hash: &str) -> StoreResult<String> {
    zone_key(RAW_ZONE, source, date, content_hash)
}

/// Key prefix for the records of one source and day: `processed/{source}/{yyyy}/{mm}/{dd}/`
pub fn processed_prefix(source: &str, date: NaiveDate) -> StoreResult<String> {
    zone_prefix(PROCESSED_ZONE, source, date)
}

/// Record key, named after the artifact it was extracted from
pub fn processed_key(source: &str, date: NaiveDate, content_hash: &str) -> StoreResult<String> {
    zone_key(PROCESSED_ZONE, source, date, content_hash)
}
