//! Storage module for persisting crawl artifacts
//!
//! This module handles everything that touches persisted state:
//! - Artifact construction, content hashing and storage keys
//! - Extraction records kept next to the raw artifacts
//! - The gzip/JSON envelope objects are written in
//! - Object store backends (memory, filesystem, SQLite)
//! - The date/source partitioned store sessions write through

mod artifact;
mod codec;
mod fs;
mod memory;
mod partitioned;
mod record;
mod schema;
mod sqlite;
mod traits;

pub use artifact::{
    content_hash, partition_prefix, processed_key, processed_prefix, storage_key, Artifact,
    PutOutcome, PROCESSED_ZONE, RAW_ZONE,
};
pub use codec::{decode, decode_record, encode, encode_record};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use partitioned::PartitionedStore;
pub use record::ProcessedRecord;
pub use sqlite::SqliteObjectStore;
pub use traits::{ObjectStore, StoreError, StoreResult};
