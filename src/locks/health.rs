//! Storage health verification.
//!
//! A backend can fail loudly (errors on write) or quietly (accepts the write
//! and forgets it). Both are caught by writing a value and reading it back.

use super::keys::LockKeys;
use super::metadata::TicketRecord;
use crate::error::{LockError, Result};
use crate::storage::Storage;
use tracing::debug;
use uuid::Uuid;

/// Probe the storage before drawing a ticket.
///
/// Writes a fresh UUID under the identity's probe key, reads it back, and
/// removes the probe again. Fails with [`LockError::StorageUnavailable`].
pub(crate) fn verify_storage(storage: &dyn Storage, keys: &LockKeys, identity: &str) -> Result<()> {
    let probe_key = keys.probe(identity);
    let value = Uuid::new_v4().to_string();

    let outcome = write_and_confirm(storage, &probe_key, &value);

    if let Err(e) = storage.remove(&probe_key) {
        debug!(probe = %probe_key, error = %e, "failed to remove storage probe");
    }

    outcome.map_err(LockError::StorageUnavailable)
}

/// Re-check the storage while waiting by rewriting our own ticket.
///
/// Bumps the heartbeat so the written value always differs from the stored
/// one; a backend that stopped persisting is then caught on read-back.
/// Fails with [`LockError::StorageDropped`].
pub(crate) fn refresh_ticket(
    storage: &dyn Storage,
    ticket_key: &str,
    ticket: &mut TicketRecord,
) -> Result<()> {
    ticket.bump();
    let json = ticket.to_json()?;
    write_and_confirm(storage, ticket_key, &json).map_err(LockError::StorageDropped)
}

fn write_and_confirm(
    storage: &dyn Storage,
    key: &str,
    value: &str,
) -> std::result::Result<(), String> {
    storage
        .set(key, value)
        .map_err(|e| format!("write to '{}' failed: {}", key, e))?;

    match storage.get(key) {
        Ok(Some(stored)) if stored == value => Ok(()),
        Ok(Some(_)) => Err(format!("value written to '{}' did not persist", key)),
        Ok(None) => Err(format!("value written to '{}' is missing on read-back", key)),
        Err(e) => Err(format!("read-back of '{}' failed: {}", key, e)),
    }
}
