//! Local Store — the persisted collection of submission records.
//!
//! The whole collection lives under one key (the namespace) as a JSON array, newest first.
//! Every mutation reads the collection, changes it, and overwrites the key. A blob that
//! does not parse is treated as an empty collection.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use crate::submission::{Payload, SubmissionKind, SubmissionRecord, SubmissionStatus};

pub const DEFAULT_STORE_PATH: &str = "./data/northbeam/submissions";
pub const DEFAULT_NAMESPACE: &str = "northbeam_submissions";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous key-value persistence for text blobs.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, text: &str) -> Result<(), StoreError>;
}

/// Sled database on the host filesystem.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open at the given path, or `./data/northbeam/submissions`.
    pub fn open(path: Option<impl AsRef<Path>>) -> Result<Self, StoreError> {
        let p = path
            .map(|x| x.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new(DEFAULT_STORE_PATH).to_path_buf());
        let db = sled::open(p)?;
        Ok(Self { db })
    }
}

impl StorageBackend for SledBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.db.get(key.as_bytes())? {
            Some(v) => String::from_utf8(v.to_vec())
                .map(Some)
                .map_err(|e| StoreError::Unavailable(format!("blob is not UTF-8: {}", e))),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, text: &str) -> Result<(), StoreError> {
        self.db.insert(key.as_bytes(), text.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// In-process backend. `set_full(true)` makes every write fail, like an exhausted quota.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
    full: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_full(&self, full: bool) {
        self.full.store(full, Ordering::SeqCst);
    }

    /// Overwrite a key directly, bypassing the store (used to plant corrupt blobs).
    pub fn put_raw(&self, key: &str, text: &str) {
        self.entries.insert(key.to_string(), text.to_string());
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn write(&self, key: &str, text: &str) -> Result<(), StoreError> {
        if self.full.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("quota exceeded".into()));
        }
        self.entries.insert(key.to_string(), text.to_string());
        Ok(())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, text: &str) -> Result<(), StoreError> {
        (**self).write(key, text)
    }
}

/// The submission collection. Construct once at startup and share it (`Arc<SubmissionStore>`).
pub struct SubmissionStore {
    backend: Box<dyn StorageBackend>,
    namespace: String,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl SubmissionStore {
    pub fn new(backend: impl StorageBackend + 'static, namespace: impl Into<String>) -> Self {
        Self {
            backend: Box::new(backend),
            namespace: namespace.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Sled-backed store at `path` (or the default path).
    pub fn open(
        path: Option<impl AsRef<Path>>,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(SledBackend::open(path)?, namespace))
    }

    /// Ephemeral store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), DEFAULT_NAMESPACE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create a record (fresh id, now, status New), put it first, persist the collection.
    /// A failed write is logged and the record is still returned.
    pub fn append(&self, kind: SubmissionKind, payload: Payload) -> SubmissionRecord {
        let _guard = self.lock();
        let record = SubmissionRecord::new(kind, payload);
        let mut records = self.load();
        records.insert(0, record.clone());
        self.persist(&records);
        tracing::info!(id = %record.id, kind = %record.kind, "submission captured");
        record
    }

    /// Full collection, newest first. Empty when nothing is stored or the blob is unreadable.
    pub fn list_all(&self) -> Vec<SubmissionRecord> {
        self.load()
    }

    pub fn get(&self, id: &str) -> Option<SubmissionRecord> {
        self.load().into_iter().find(|r| r.id == id)
    }

    /// Overwrite the status of `id`. Returns false (and writes nothing) if absent.
    pub fn set_status(&self, id: &str, status: SubmissionStatus) -> bool {
        let _guard = self.lock();
        let mut records = self.load();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        record.status = status;
        self.persist(&records);
        tracing::info!(id, status = %status, "submission status changed");
        true
    }

    /// Read, transform and persist the status of `id` under one lock. `None` if absent.
    pub fn update_status(
        &self,
        id: &str,
        f: impl FnOnce(SubmissionStatus) -> SubmissionStatus,
    ) -> Option<SubmissionStatus> {
        let _guard = self.lock();
        let mut records = self.load();
        let record = records.iter_mut().find(|r| r.id == id)?;
        let status = f(record.status);
        record.status = status;
        self.persist(&records);
        tracing::info!(id, status = %status, "submission status changed");
        Some(status)
    }

    /// Drop `id` from the collection. Returns false (and writes nothing) if absent.
    pub fn remove(&self, id: &str) -> bool {
        let _guard = self.lock();
        let mut records = self.load();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return false;
        }
        self.persist(&records);
        tracing::info!(id, "submission removed");
        true
    }

    /// Persist an empty collection.
    pub fn clear(&self) {
        let _guard = self.lock();
        self.persist(&[]);
        tracing::info!(namespace = %self.namespace, "submission store wiped");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Vec<SubmissionRecord> {
        let text = match self.backend.read(&self.namespace) {
            Ok(Some(text)) => text,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("submission store read failed, treating as empty: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("submission store blob unreadable, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    fn persist(&self, records: &[SubmissionRecord]) {
        let result = serde_json::to_string(records)
            .map_err(StoreError::from)
            .and_then(|text| self.backend.write(&self.namespace, &text));
        if let Err(e) = result {
            tracing::warn!("submission store write not persisted: {}", e);
        }
    }
}
