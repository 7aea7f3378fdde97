//! Filesystem utilities for bakery-lock.
//!
//! Atomic writes back [`FileStorage`](crate::storage::FileStorage): a reader
//! in another process must never observe a half-written record.

pub mod atomic;

pub use atomic::atomic_write;
