use crate::storage::traits::validate_key;
use crate::storage::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TEMP_PREFIX: &str = ".partial-";

/// Object store backed by a directory tree
///
/// Each key maps to a file below the root. Writes go to a temporary file in
/// the target directory and are linked into place without clobbering, so a
/// reader sees either nothing or the complete object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Opens (and creates if needed) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
}

fn write_new(path: &Path, bytes: &[u8]) -> StoreResult<bool> {
    if path.exists() {
        return Ok(false);
    }

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    persist(temp, path)
}

fn persist(temp: NamedTempFile, path: &Path) -> StoreResult<bool> {
    match temp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::Io(e.error)),
    }
}

fn collect_files(dir: &Path, prefix_key: &str, out: &mut Vec<String>) -> StoreResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let key = if prefix_key.is_empty() {
            name
        } else {
            format!("{}/{}", prefix_key, name)
        };

        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &key, out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        blocking(move || write_new(&path, &bytes)).await
    }

    async fn object_exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // walk from the deepest directory the prefix names
        let dir_key = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let dir = if dir_key.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_key)?
        };

        let dir_key = dir_key.to_string();
        let prefix = prefix.to_string();
        blocking(move || {
            let mut keys = Vec::new();
            collect_files(&dir, &dir_key, &mut keys)?;
            keys.retain(|key| key.starts_with(&prefix));
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn get_object(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
