//! Storage key naming for a lock's records.
//!
//! Every record key embeds the identity, so concurrent identities never write
//! the same key:
//! - `{lock}:entering:{identity}`
//! - `{lock}:ticket:{identity}`
//! - `{lock}:probe:{identity}` (health checks only, removed right away)

const ENTERING: &str = "entering";
const TICKET: &str = "ticket";
const PROBE: &str = "probe";

/// Key builder for one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeys {
    lock: String,
}

impl LockKeys {
    pub fn new(lock: &str) -> Self {
        Self {
            lock: lock.to_string(),
        }
    }

    /// The lock key itself.
    pub fn lock(&self) -> &str {
        &self.lock
    }

    pub fn entering(&self, identity: &str) -> String {
        format!("{}{}", self.entering_prefix(), identity)
    }

    pub fn ticket(&self, identity: &str) -> String {
        format!("{}{}", self.ticket_prefix(), identity)
    }

    pub fn probe(&self, identity: &str) -> String {
        format!("{}:{}:{}", self.lock, PROBE, identity)
    }

    pub fn entering_prefix(&self) -> String {
        format!("{}:{}:", self.lock, ENTERING)
    }

    pub fn ticket_prefix(&self) -> String {
        format!("{}:{}:", self.lock, TICKET)
    }

    /// Identity encoded in an entering-flag key, if the key belongs to this lock.
    pub fn entering_identity<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(&self.entering_prefix())
    }

    /// Identity encoded in a ticket key, if the key belongs to this lock.
    pub fn ticket_identity<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(&self.ticket_prefix())
    }
}
