use crate::config::{StorageBackend, StorageConfig};
use crate::storage::{
    codec, partition_prefix, processed_prefix, Artifact, FsObjectStore, MemoryObjectStore,
    ObjectStore, ProcessedRecord, PutOutcome, SqliteObjectStore, StoreError, StoreResult,
};
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Date/source partitioned artifact store
///
/// Artifacts are stored at `raw/{source}/{yyyy}/{mm}/{dd}/{content_hash}.json.gz`,
/// so storing identical content twice on the same day is a no-op. Extraction
/// records sit under the same path in the `processed/` zone.
#[derive(Clone)]
pub struct PartitionedStore {
    backend: Arc<dyn ObjectStore>,
}

impl PartitionedStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    /// Opens the backend named in the storage config
    pub fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        let backend: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::Filesystem => Arc::new(FsObjectStore::new(&config.path)?),
            StorageBackend::Sqlite => Arc::new(SqliteObjectStore::open(Path::new(&config.path))?),
            StorageBackend::Memory => Arc::new(MemoryObjectStore::new()),
        };
        Ok(Self::new(backend))
    }

    /// A store that keeps everything in memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryObjectStore::new()))
    }

    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.backend
    }

    /// Stores an artifact unless an object already exists at its key
    pub async fn put(&self, artifact: &Artifact) -> StoreResult<PutOutcome> {
        let key = artifact.storage_key()?;
        let outcome = self.put_once(key, || codec::encode(artifact)).await?;
        if outcome.is_new() {
            debug!(key = %outcome.key(), url = %artifact.source_url, "Artifact stored");
        }
        Ok(outcome)
    }

    /// Stores an extraction record unless one exists for the same artifact
    pub async fn put_processed(&self, record: &ProcessedRecord) -> StoreResult<PutOutcome> {
        let key = record.storage_key()?;
        let outcome = self.put_once(key, || codec::encode_record(record)).await?;
        if outcome.is_new() {
            debug!(key = %outcome.key(), url = %record.source_url, "Record stored");
        }
        Ok(outcome)
    }

    async fn put_once<F>(&self, key: String, encode: F) -> StoreResult<PutOutcome>
    where
        F: FnOnce() -> StoreResult<Vec<u8>>,
    {
        if self.backend.object_exists(&key).await? {
            debug!(key = %key, "Object already present");
            return Ok(PutOutcome::AlreadyPresent { key });
        }

        if self.backend.put_object(&key, encode()?).await? {
            Ok(PutOutcome::Stored { key })
        } else {
            Ok(PutOutcome::AlreadyPresent { key })
        }
    }

    /// Lists the keys stored for one source and day, in ascending order
    pub async fn list_keys(&self, source: &str, date: NaiveDate) -> StoreResult<Vec<String>> {
        let prefix = partition_prefix(source, date)?;
        self.backend.list_objects(&prefix).await
    }

    /// Extraction records of one source and day, in key order
    pub async fn processed(&self, source: &str, date: NaiveDate) -> StoreResult<Vec<ProcessedRecord>> {
        let keys = self.backend.list_objects(&processed_prefix(source, date)?).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            match self.backend.get_object(&key).await? {
                Some(bytes) => records.push(codec::decode_record(&bytes)?),
                None => {
                    return Err(StoreError::Backend(format!(
                        "object '{}' disappeared while reading",
                        key
                    )))
                }
            }
        }
        Ok(records)
    }

    /// Streams the artifacts of `source` stored within `dates`
    ///
    /// Ascending by date, then by key within a day. The stream is lazy: each
    /// day is listed only when the previous one is exhausted. Calling `get`
    /// again starts over from the first day.
    pub fn get(
        &self,
        source: &str,
        dates: RangeInclusive<NaiveDate>,
    ) -> BoxStream<'static, StoreResult<Artifact>> {
        let (start, end) = dates.into_inner();
        let state = ReadState {
            backend: self.backend.clone(),
            source: source.to_string(),
            next_date: (start <= end).then_some(start),
            end,
            pending: VecDeque::new(),
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(key) = state.pending.pop_front() {
                    let item = match state.backend.get_object(&key).await {
                        Ok(Some(bytes)) => codec::decode(&bytes),
                        Ok(None) => Err(StoreError::Backend(format!(
                            "object '{}' disappeared while reading",
                            key
                        ))),
                        Err(e) => Err(e),
                    };
                    return Some((item, state));
                }

                let date = state.next_date?;
                state.next_date = date.succ_opt().filter(|next| *next <= state.end);

                let listed = match partition_prefix(&state.source, date) {
                    Ok(prefix) => state.backend.list_objects(&prefix).await,
                    Err(e) => Err(e),
                };
                match listed {
                    Ok(keys) => state.pending.extend(keys),
                    Err(e) => {
                        state.next_date = None;
                        return Some((Err(e), state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct ReadState {
    backend: Arc<dyn ObjectStore>,
    source: String,
    next_date: Option<NaiveDate>,
    end: NaiveDate,
    pending: VecDeque<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use futures::TryStreamExt;
    use url::Url;

    fn artifact(source: &str, day: u32, body: &str) -> Artifact {
        Artifact::new(
            source,
            Url::parse("https://example.com/page").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            Some("text/html".to_string()),
            200,
            body.as_bytes().to_vec(),
        )
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[tokio::test]
    async fn test_put_twice_keeps_one_object() {
        let store = PartitionedStore::in_memory();
        let item = artifact("siteA", 1, "same");

        let first = store.put(&item).await.unwrap();
        let second = store.put(&item).await.unwrap();

        assert!(first.is_new());
        assert_eq!(
            second,
            PutOutcome::AlreadyPresent {
                key: first.key().to_string()
            }
        );
        assert_eq!(store.list_keys("siteA", date(1)).await.unwrap().len(), 1);
        assert!(first.key().starts_with("raw/siteA/2024/05/01/"));
        assert!(first.key().ends_with(".json.gz"));
    }

    #[tokio::test]
    async fn test_processed_records_are_idempotent_and_apart_from_raw() {
        let store = PartitionedStore::in_memory();
        let item = artifact("siteA", 1, "page");
        store.put(&item).await.unwrap();

        let record = ProcessedRecord::from_artifact(&item, serde_json::json!({"title": "page"}));
        let first = store.put_processed(&record).await.unwrap();
        let second = store.put_processed(&record).await.unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert!(first.key().starts_with("processed/siteA/2024/05/01/"));
        assert_eq!(store.list_keys("siteA", date(1)).await.unwrap().len(), 1);

        let records = store.processed("siteA", date(1)).await.unwrap();
        assert_eq!(records, vec![record]);

        let raw: Vec<Artifact> = store
            .get("siteA", date(1)..=date(1))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(raw, vec![item]);
    }

    #[tokio::test]
    async fn test_get_yields_ascending_dates() {
        let store = PartitionedStore::in_memory();
        store.put(&artifact("siteA", 3, "third")).await.unwrap();
        store.put(&artifact("siteA", 1, "first")).await.unwrap();
        store.put(&artifact("siteA", 2, "second")).await.unwrap();
        store.put(&artifact("other", 2, "elsewhere")).await.unwrap();

        let items: Vec<Artifact> = store
            .get("siteA", date(1)..=date(3))
            .try_collect()
            .await
            .unwrap();

        let days: Vec<NaiveDate> = items.iter().map(|a| a.logical_date).collect();
        assert_eq!(days, vec![date(1), date(2), date(3)]);
        assert_eq!(items[0].payload, b"first");
    }

    #[tokio::test]
    async fn test_get_is_restartable_and_bounded() {
        let store = PartitionedStore::in_memory();
        for day in 1..=4 {
            store
                .put(&artifact("siteA", day, &format!("day {}", day)))
                .await
                .unwrap();
        }

        let first: Vec<Artifact> = store
            .get("siteA", date(2)..=date(3))
            .try_collect()
            .await
            .unwrap();
        let again: Vec<Artifact> = store
            .get("siteA", date(2)..=date(3))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_get_empty_range() {
        let store = PartitionedStore::in_memory();
        store.put(&artifact("siteA", 1, "x")).await.unwrap();

        let items: Vec<Artifact> = store
            .get("siteA", date(3)..=date(1))
            .try_collect()
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            path: String::new(),
        };
        let store = PartitionedStore::from_config(&config).unwrap();
        assert!(store.put(&artifact("siteA", 1, "x")).await.unwrap().is_new());
    }
}
