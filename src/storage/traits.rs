//! Storage traits and error types
//!
//! This module defines the object store interface the partitioned store
//! writes through, and the associated error type.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Flat key/value object store
///
/// Keys are `/`-separated paths. Implementations must make each write
/// atomic: a reader never observes a partially written object, and two
/// writers racing on one key leave exactly one object behind.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` under `key` unless the key already exists
    ///
    /// Returns `true` when this call created the object.
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> StoreResult<bool>;

    /// Checks whether an object exists
    async fn object_exists(&self, key: &str) -> StoreResult<bool>;

    /// Lists every key starting with `prefix`, in ascending order
    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Reads an object
    async fn get_object(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
}

/// Rejects keys that could escape a storage root
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
