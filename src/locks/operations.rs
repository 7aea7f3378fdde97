//! Ticket loading, listing, and clearing operations.

use super::keys::LockKeys;
use super::metadata::{EnteringRecord, TicketRecord};
use super::types::TicketInfo;
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::storage::{Storage, StorageResult};
use tracing::debug;

/// Read and validate the ticket stored under `key`.
///
/// Returns the raw JSON alongside the parsed record. Records that fail to
/// parse, belong to another lock, or carry a zero number are treated as
/// absent.
pub(super) fn load_ticket(
    storage: &dyn Storage,
    keys: &LockKeys,
    key: &str,
) -> StorageResult<Option<(String, TicketRecord)>> {
    let Some(identity) = keys.ticket_identity(key) else {
        return Ok(None);
    };
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };

    match TicketRecord::from_json(&raw) {
        Ok(record)
            if record.lock == keys.lock() && record.identity == identity && record.number > 0 =>
        {
            Ok(Some((raw, record)))
        }
        Ok(_) => Ok(None),
        Err(e) => {
            debug!(key, error = %e, "ignoring unreadable ticket record");
            Ok(None)
        }
    }
}

/// Read and validate the entering flag stored under `key`.
pub(super) fn load_entering(
    storage: &dyn Storage,
    keys: &LockKeys,
    key: &str,
) -> StorageResult<Option<(String, EnteringRecord)>> {
    let Some(identity) = keys.entering_identity(key) else {
        return Ok(None);
    };
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };

    match EnteringRecord::from_json(&raw) {
        Ok(record) if record.lock == keys.lock() && record.identity == identity => {
            Ok(Some((raw, record)))
        }
        Ok(_) => Ok(None),
        Err(e) => {
            debug!(key, error = %e, "ignoring unreadable entering record");
            Ok(None)
        }
    }
}

/// List all tickets of a lock.
///
/// # Arguments
///
/// * `storage` - The shared storage
/// * `lock` - The lock key
/// * `config` - The lock configuration (its timeout is the stale threshold)
///
/// # Returns
///
/// A vector of `TicketInfo` sorted in bakery order (number, then identity).
pub fn list_tickets(
    storage: &dyn Storage,
    lock: &str,
    config: &LockConfig,
) -> Result<Vec<TicketInfo>> {
    let keys = LockKeys::new(lock);
    let mut tickets = Vec::new();

    let ticket_keys = storage
        .keys(&keys.ticket_prefix())
        .map_err(LockError::unavailable)?;

    for key in ticket_keys {
        let Some((_, record)) = load_ticket(storage, &keys, &key).map_err(LockError::unavailable)?
        else {
            continue;
        };

        let entering = load_entering(storage, &keys, &keys.entering(&record.identity))
            .map_err(LockError::unavailable)?
            .is_some();
        let is_stale = record.is_stale(config.timeout());

        tickets.push(TicketInfo {
            key,
            record,
            entering,
            is_stale,
        });
    }

    tickets.sort_by(|a, b| a.record.order().cmp(&b.record.order()));

    Ok(tickets)
}

/// Clear an identity's ticket and entering flag.
///
/// The caller is responsible for verifying that clearing the ticket is
/// appropriate: a live holder whose ticket is cleared loses mutual exclusion.
///
/// # Returns
///
/// * `Ok(TicketInfo)` - Information about the cleared ticket
/// * `Err(LockError::UserError)` - No ticket exists for the identity
pub fn clear_ticket(
    storage: &dyn Storage,
    lock: &str,
    identity: &str,
    config: &LockConfig,
) -> Result<TicketInfo> {
    let keys = LockKeys::new(lock);
    let key = keys.ticket(identity);

    let Some((_, record)) = load_ticket(storage, &keys, &key).map_err(LockError::unavailable)?
    else {
        return Err(LockError::UserError(format!(
            "ticket for '{}' does not exist on lock '{}'",
            identity, lock
        )));
    };

    let entering_key = keys.entering(identity);
    let entering = load_entering(storage, &keys, &entering_key)
        .map_err(LockError::unavailable)?
        .is_some();
    let is_stale = record.is_stale(config.timeout());

    storage
        .remove(&entering_key)
        .map_err(LockError::unavailable)?;
    storage.remove(&key).map_err(LockError::unavailable)?;

    Ok(TicketInfo {
        key,
        record,
        entering,
        is_stale,
    })
}
