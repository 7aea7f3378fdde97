//! Locking subsystem for bakery-lock.
//!
//! This module implements mutual exclusion over a plain key/value store:
//! - [`SharedLock`]: the handle callers use, with its local FIFO queue
//! - the bakery ticket protocol that orders identities across processes
//! - storage health checks that catch backends which fail or stop persisting
//!
//! # Records
//!
//! Every identity taking part in a lock owns up to two records, both named
//! after the lock key and the identity (see [`LockKeys`]):
//! - an entering flag, raised only while the identity picks its number
//! - a ticket holding its number in the bakery order
//!
//! Records are JSON. Tickets carry the owner (`user@HOST`), the process ID,
//! and RFC3339 timestamps, so an operator can inspect them with
//! [`list_tickets`] and remove leftovers with [`clear_ticket`].
//!
//! # RAII Guards
//!
//! A held lock is represented by a guard that removes the identity's records
//! when dropped. If removal fails, a warning is logged but the program does
//! not crash; the next contender will eventually take over after the timeout.

mod guard;
mod health;
mod keys;
mod metadata;
mod operations;
mod protocol;
mod shared;
mod types;


// Re-export public API
pub use guard::TicketGuard;
pub use keys::LockKeys;
pub use metadata::{EnteringRecord, TicketRecord};
pub use operations::{clear_ticket, list_tickets};
pub use shared::{ErrorCallback, SharedLock, SharedLockGuard};
pub use types::TicketInfo;
