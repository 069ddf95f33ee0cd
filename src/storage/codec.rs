//! Artifact serialization
//!
//! Objects are gzip-compressed JSON envelopes holding the artifact metadata
//! and the base64-encoded payload. Extraction records use the same gzip JSON
//! framing without the payload.

use crate::storage::{content_hash, Artifact, ProcessedRecord, StoreError, StoreResult};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    source: String,
    source_url: String,
    logical_date: NaiveDate,
    fetched_at: DateTime<Utc>,
    content_type: Option<String>,
    status: u16,
    content_hash: String,
    payload: String,
}

/// Serializes an artifact into its stored form
pub fn encode(artifact: &Artifact) -> StoreResult<Vec<u8>> {
    let envelope = Envelope {
        source: artifact.source.clone(),
        source_url: artifact.source_url.to_string(),
        logical_date: artifact.logical_date,
        fetched_at: artifact.fetched_at,
        content_type: artifact.content_type.clone(),
        status: artifact.status,
        content_hash: artifact.content_hash.clone(),
        payload: general_purpose::STANDARD.encode(&artifact.payload),
    };

    gzip_json(&envelope)
}

/// Restores an artifact from its stored form
///
/// The payload hash is recomputed; a mismatch is a codec error.
pub fn decode(bytes: &[u8]) -> StoreResult<Artifact> {
    let envelope: Envelope = gunzip_json(bytes)?;

    let payload = general_purpose::STANDARD
        .decode(envelope.payload.as_bytes())
        .map_err(|e| StoreError::Codec(format!("base64: {}", e)))?;

    if content_hash(&payload) != envelope.content_hash {
        return Err(StoreError::Codec(format!(
            "content hash mismatch for {}",
            envelope.source_url
        )));
    }

    let source_url = Url::parse(&envelope.source_url)
        .map_err(|e| StoreError::Codec(format!("source url: {}", e)))?;

    Ok(Artifact {
        source: envelope.source,
        source_url,
        logical_date: envelope.logical_date,
        fetched_at: envelope.fetched_at,
        content_type: envelope.content_type,
        status: envelope.status,
        payload,
        content_hash: envelope.content_hash,
    })
}

/// Serializes an extraction record into its stored form
pub fn encode_record(record: &ProcessedRecord) -> StoreResult<Vec<u8>> {
    gzip_json(record)
}

/// Restores an extraction record from its stored form
pub fn decode_record(bytes: &[u8]) -> StoreResult<ProcessedRecord> {
    gunzip_json(bytes)
}

fn gzip_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

fn gunzip_json<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| StoreError::Codec(format!("gzip: {}", e)))?;

    serde_json::from_slice(&json).map_err(|e| StoreError::Codec(e.to_string()))
}
