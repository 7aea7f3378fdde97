//! Error types for bakery-lock.
//!
//! Uses thiserror for derive macros. Acquisition failures are reported through
//! `on_error` callbacks or returned from the async APIs; they never panic.

use crate::exit_codes;
use crate::storage::StorageError;
use thiserror::Error;

/// Main error type for lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The storage probe failed before ticketing started.
    #[error("storage support check failed: {0}")]
    StorageUnavailable(String),

    /// Storage passed the initial probe but failed later while acquiring.
    #[error("storage support dropped while acquiring lock: {0}")]
    StorageDropped(String),

    /// Removing a held ticket from storage failed.
    #[error("failed to release ticket '{ticket}': {source}")]
    ReleaseFailed {
        ticket: String,
        #[source]
        source: StorageError,
    },

    /// Invalid arguments, invalid configuration, or an unknown ticket.
    #[error("{0}")]
    UserError(String),

    /// The local queue went away before the request was answered.
    #[error("lock request was abandoned before it completed")]
    Abandoned,

    /// The request was made outside a Tokio runtime, so nothing can serve it.
    #[error("no Tokio runtime to serve the lock request: {0}")]
    NoRuntime(String),
}

impl LockError {
    /// Returns the CLI exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::StorageUnavailable(_)
            | LockError::StorageDropped(_)
            | LockError::ReleaseFailed { .. } => exit_codes::STORAGE_FAILURE,
            LockError::UserError(_) | LockError::Abandoned | LockError::NoRuntime(_) => {
                exit_codes::USER_ERROR
            }
        }
    }

    /// Whether the error came from the storage backend.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            LockError::StorageUnavailable(_)
                | LockError::StorageDropped(_)
                | LockError::ReleaseFailed { .. }
        )
    }

    pub(crate) fn unavailable(err: StorageError) -> Self {
        LockError::StorageUnavailable(err.to_string())
    }

    pub(crate) fn dropped(err: StorageError) -> Self {
        LockError::StorageDropped(err.to_string())
    }
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
