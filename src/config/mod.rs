//! Configuration model for bakery-lock.
//!
//! This module defines [`LockConfig`], the timing knobs of a [`SharedLock`].
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//!
//! [`SharedLock`]: crate::lock::SharedLock

mod model;
mod operations;


pub use model::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS, LockConfig};
