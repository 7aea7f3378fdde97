//! bakery-lock: mutual exclusion between uncoordinated processes that share
//! nothing but a key/value store.
//!
//! The store only needs single-key `get`/`set`/`remove` and listing by
//! prefix. On top of that, [`SharedLock`] layers Lamport's bakery algorithm:
//! each contender draws a ticket one above every visible ticket and waits
//! until no lower ticket remains. Holders that crash are taken over once they
//! have blocked a waiter for longer than the configured timeout, and storage
//! that fails or silently discards writes is detected by write-then-read-back
//! probes.
//!
//! ```no_run
//! use bakery_lock::{FileStorage, LockConfig, SharedLock};
//! use std::sync::Arc;
//!
//! # async fn demo() -> bakery_lock::Result<()> {
//! let storage = FileStorage::open("/tmp/locks").expect("storage directory");
//! let lock = SharedLock::new("nightly-report", Arc::new(storage), LockConfig::default())?;
//!
//! let guard = lock.lock(None).await?;
//! // ... exclusive work ...
//! guard.release()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::LockConfig;
pub use error::{LockError, Result};
pub use locks::{
    ErrorCallback, SharedLock, SharedLockGuard, TicketInfo, clear_ticket, list_tickets,
};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
