//! RAII ticket guard implementation.

use super::keys::LockKeys;
use crate::error::{LockError, Result};
use crate::storage::{Storage, StorageResult};
use std::sync::Arc;
use tracing::warn;

/// RAII guard for an identity's ticket.
///
/// When dropped, the identity's ticket and entering flag are removed from
/// storage, which releases the lock (or abandons the attempt).
/// If removal fails, a warning is logged but no panic occurs.
pub struct TicketGuard {
    storage: Arc<dyn Storage>,

    /// Key of the ticket record.
    ticket_key: String,

    /// Key of the entering flag.
    entering_key: String,

    identity: String,

    /// Whether the ticket has been released manually.
    released: bool,
}

impl TicketGuard {
    /// Create a guard over `identity`'s records under `keys`.
    pub(super) fn new(storage: Arc<dyn Storage>, keys: &LockKeys, identity: &str) -> Self {
        Self {
            storage,
            ticket_key: keys.ticket(identity),
            entering_key: keys.entering(identity),
            identity: identity.to_string(),
            released: false,
        }
    }

    /// The identity owning the ticket.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Storage key of the ticket record.
    pub fn ticket_key(&self) -> &str {
        &self.ticket_key
    }

    /// Manually release the ticket.
    ///
    /// This is useful when you want to handle release errors explicitly
    /// instead of having them logged on drop.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.clear().map_err(|source| LockError::ReleaseFailed {
            ticket: self.ticket_key.clone(),
            source,
        })
    }

    fn clear(&self) -> StorageResult<()> {
        let entering = self.storage.remove(&self.entering_key);
        self.storage.remove(&self.ticket_key)?;
        entering
    }
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.clear()
        {
            warn!(
                ticket = %self.ticket_key,
                error = %e,
                "failed to release ticket"
            );
        }
    }
}

impl std::fmt::Debug for TicketGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketGuard")
            .field("ticket_key", &self.ticket_key)
            .field("identity", &self.identity)
            .field("released", &self.released)
            .finish()
    }
}
