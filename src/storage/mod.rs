//! Storage capability used to coordinate lock holders.
//!
//! The lock protocol only needs four single-key operations: `get`, `set`,
//! `remove`, and enumeration by prefix. Backends are expected to make each
//! single-key operation atomic and immediately visible to every other reader.
//! Nothing else is assumed: no cross-key atomicity, no compare-and-swap, no
//! change notifications.
//!
//! Two backends ship with the crate:
//! - [`MemoryStorage`]: a shared in-process map. Clones share state, which
//!   makes it possible to run several independent lock instances against one
//!   medium.
//! - [`FileStorage`]: one file per key inside a directory, written atomically.
//!   Usable between unrelated OS processes.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

/// Errors reported by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend refused the operation.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// An I/O operation on a key failed.
    #[error("I/O error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A shared key/value medium.
///
/// Implementations must be safe to share between threads; every lock
/// instance holds an `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// List every key starting with `prefix`.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
