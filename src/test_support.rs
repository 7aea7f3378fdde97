use crate::storage::{MemoryStorage, Storage, StorageError, StorageResult};
use std::sync::{Arc, Mutex};

/// How a [`FaultyStorage`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Behaves like the wrapped memory storage.
    Healthy,
    /// Every write fails.
    Throwing,
    /// Writes report success but are silently discarded.
    Discarding,
}

/// Memory storage with switchable failure injection.
///
/// Clones share both the entries and the fault setting, so a test can keep a
/// handle and break the storage while a lock is in the middle of acquiring.
#[derive(Debug, Clone)]
pub(crate) struct FaultyStorage {
    inner: MemoryStorage,
    fault: Arc<Mutex<Fault>>,
}

impl FaultyStorage {
    pub(crate) fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fault: Arc::new(Mutex::new(fault)),
        }
    }

    pub(crate) fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap_or_else(|p| p.into_inner()) = fault;
    }

    pub(crate) fn memory(&self) -> &MemoryStorage {
        &self.inner
    }

    fn fault(&self) -> Fault {
        *self.fault.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Storage for FaultyStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        match self.fault() {
            Fault::Healthy => self.inner.set(key, value),
            Fault::Throwing => Err(StorageError::Unavailable("quota exceeded".to_string())),
            Fault::Discarding => Ok(()),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.fault() {
            Fault::Healthy => self.inner.remove(key),
            Fault::Throwing => Err(StorageError::Unavailable("quota exceeded".to_string())),
            Fault::Discarding => Ok(()),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.keys(prefix)
    }
}

/// Keys left in `storage` that belong to `lock`.
pub(crate) fn lock_records(storage: &MemoryStorage, lock: &str) -> Vec<String> {
    storage
        .keys(&format!("{}:", lock))
        .unwrap_or_default()
}
