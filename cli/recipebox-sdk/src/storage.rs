//! Local key-value persistence.
//!
//! The session manager and the like store keep their state in a flat map of
//! string keys to JSON-encoded string values. [FileStore] keeps that map in a
//! single JSON file, [MemoryStore] keeps it in memory for tests and
//! throwaway sessions.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fslock::LockFile;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const STORE_FILENAME: &str = "local_storage.json";

/// A store shared between the session manager and the like store.
pub type SharedStore = Arc<dyn KeyValueStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("couldn't acquire storage file lock")]
    AcquireLock(#[source] fslock::Error),
    #[error("couldn't read storage file")]
    ReadFile(#[source] std::io::Error),
    #[error("failed to write storage file")]
    WriteFile(#[source] SerializeError),
    #[error("couldn't encode value for key '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage is poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("file stored in an invalid location: {0}")]
    InvalidLocation(PathBuf),
    #[error("failed to create storage directory")]
    CreateDir(#[source] std::io::Error),
    #[error("failed to open temporary file")]
    OpenTmpFile(#[source] std::io::Error),
    #[error("failed to rename temporary file")]
    RenameTmpFile(#[source] tempfile::PersistError),
    #[error("failed to write temporary file")]
    WriteTmpFile(#[source] serde_json::Error),
}

/// String keys to string values, the way a browser's local storage works.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Serialize `value` as JSON and store it under `key`.
pub fn set_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: ?Sized + Serialize,
{
    let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, encoded)
}

/// Returns a `tracing`-compatible form of a [Path]
pub fn traceable_path(p: impl AsRef<Path>) -> impl tracing::Value {
    let path = p.as_ref();
    path.display().to_string()
}

/// Serialize a value and write it to disk atomically.
///
/// First the value is written to a temporary file,
/// and then it is renamed so the write appears atomic.
/// This also takes a [LockFile] argument to ensure that the write can only be
/// performed when the lock is acquired.
/// `path` must have a parent directory.
pub fn serialize_atomically<T>(
    value: &T,
    path: &impl AsRef<Path>,
    _lock: &LockFile,
) -> Result<(), SerializeError>
where
    T: ?Sized + Serialize,
{
    let parent = path
        .as_ref()
        .parent()
        .ok_or(SerializeError::InvalidLocation(path.as_ref().to_path_buf()))?;
    let temp_file = tempfile::NamedTempFile::new_in(parent).map_err(SerializeError::OpenTmpFile)?;

    let writer = BufWriter::new(&temp_file);
    serde_json::to_writer_pretty(writer, value).map_err(SerializeError::WriteTmpFile)?;
    temp_file
        .persist(path.as_ref())
        .map_err(SerializeError::RenameTmpFile)?;
    Ok(())
}

/// A [KeyValueStore] backed by a single JSON object on disk.
///
/// Every operation takes the file lock, so separate processes sharing a data
/// directory see each other's writes.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (or prepare to create) the store file in `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::WriteFile(SerializeError::CreateDir(e)))?;
        Ok(Self {
            path: data_dir.join(STORE_FILENAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The lock file lives next to the store file. Its presence does not
    /// indicate an active lock because the file isn't removed after use.
    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn acquire_lock(&self) -> Result<LockFile, StoreError> {
        let mut lock =
            LockFile::open(self.lock_path().as_os_str()).map_err(StoreError::AcquireLock)?;
        lock.lock().map_err(StoreError::AcquireLock)?;
        Ok(lock)
    }

    /// Returns the parsed file, or an empty map if it doesn't exist yet or
    /// can't be parsed. The next write replaces a corrupt file.
    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            debug!(path = traceable_path(&self.path), "storage file not found");
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(StoreError::ReadFile)?;
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(
                    path = traceable_path(&self.path),
                    error = %err,
                    "storage file is corrupt, starting over"
                );
                Ok(BTreeMap::new())
            },
        }
    }

    fn lock_and_read(&self) -> Result<(LockFile, BTreeMap<String, String>), StoreError> {
        let lock = self.acquire_lock()?;
        let entries = self.read()?;
        Ok((lock, entries))
    }

    fn write(&self, entries: &BTreeMap<String, String>, lock: &LockFile) -> Result<(), StoreError> {
        serialize_atomically(entries, &self.path, lock).map_err(StoreError::WriteFile)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let (_lock, mut entries) = self.lock_and_read()?;
        Ok(entries.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let (lock, mut entries) = self.lock_and_read()?;
        entries.insert(key.to_string(), value);
        debug!(key, path = traceable_path(&self.path), "writing storage file");
        self.write(&entries, &lock)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let (lock, mut entries) = self.lock_and_read()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        debug!(key, path = traceable_path(&self.path), "removing key from storage file");
        self.write(&entries, &lock)
    }
}

/// A [KeyValueStore] that only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
