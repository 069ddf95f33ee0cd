//! SQLite object store
//!
//! Stores every object as a blob row keyed by its storage key. `INSERT OR
//! IGNORE` on the primary key makes each write atomic and idempotent.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::validate_key;
use crate::storage::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite storage backend
#[derive(Clone)]
pub struct SqliteObjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteObjectStore {
    /// Opens (or creates) the database file at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> StoreResult<bool> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO objects (key, data, size, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![key, bytes, bytes.len() as i64, Utc::now().to_rfc3339()],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn object_exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM objects WHERE key = ?1",
                    params![key],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM objects WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![prefix], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn get_object(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let key = key.to_string();
        self.with_conn(move |conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM objects WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(data)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_or_ignore() {
        let store = SqliteObjectStore::in_memory().unwrap();

        assert!(store.put_object("raw/a/1", b"one".to_vec()).await.unwrap());
        assert!(!store.put_object("raw/a/1", b"two".to_vec()).await.unwrap());
        assert_eq!(
            store.get_object("raw/a/1").await.unwrap(),
            Some(b"one".to_vec())
        );
    }

    #[tokio::test]
    async fn test_list_and_exists() {
        let store = SqliteObjectStore::in_memory().unwrap();
        for key in ["raw/a/2", "raw/a/1", "raw/ab/1"] {
            store.put_object(key, Vec::new()).await.unwrap();
        }

        assert_eq!(
            store.list_objects("raw/a/").await.unwrap(),
            vec!["raw/a/1".to_string(), "raw/a/2".to_string()]
        );
        assert!(store.object_exists("raw/ab/1").await.unwrap());
        assert!(!store.object_exists("raw/ab/2").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store/objects.db");

        {
            let store = SqliteObjectStore::open(&path).unwrap();
            store.put_object("raw/a/1", b"kept".to_vec()).await.unwrap();
        }

        let reopened = SqliteObjectStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_object("raw/a/1").await.unwrap(),
            Some(b"kept".to_vec())
        );
    }
}
