//! Persisted lock records and utilities.

use crate::error::{LockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A ticket: one identity's position in the bakery order for a lock.
///
/// The ticket record doubles as the waiter's heartbeat: every health
/// re-check bumps `beat` and `refreshed_at`, so a live waiter's record keeps
/// changing while a crashed holder's stays frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// The lock key this ticket belongs to.
    pub lock: String,

    /// The identity holding the ticket.
    pub identity: String,

    /// Position in the bakery order. Zero means "not contending".
    pub number: u64,

    /// Heartbeat counter, incremented by each in-wait health re-check.
    #[serde(default)]
    pub beat: u64,

    /// Owner of the ticket (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the ticket holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// When the ticket was drawn (RFC3339).
    pub issued_at: DateTime<Utc>,

    /// When the record was last rewritten (RFC3339).
    pub refreshed_at: DateTime<Utc>,
}

impl TicketRecord {
    /// Create a new ticket record with the current timestamp.
    pub fn new(lock: &str, identity: &str, number: u64) -> Self {
        let now = Utc::now();
        Self {
            lock: lock.to_string(),
            identity: identity.to_string(),
            number,
            beat: 0,
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            issued_at: now,
            refreshed_at: now,
        }
    }

    /// Parse a ticket record from its stored JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LockError::UserError(format!("failed to parse ticket record: {}", e)))
    }

    /// Serialize the ticket record to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize ticket record: {}", e)))
    }

    /// Advance the heartbeat.
    pub fn bump(&mut self) {
        self.beat += 1;
        self.refreshed_at = Utc::now();
    }

    /// Sort key in the bakery order: number first, identity breaks ties.
    pub fn order(&self) -> (u64, &str) {
        (self.number, self.identity.as_str())
    }

    /// Whether this ticket must be served before `other`.
    pub fn precedes(&self, other: &TicketRecord) -> bool {
        self.order() < other.order()
    }

    /// Time since the record was last rewritten.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.refreshed_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }

    /// Check if the ticket has gone unrefreshed for longer than `stale_after`.
    pub fn is_stale(&self, stale_after: std::time::Duration) -> bool {
        match Duration::from_std(stale_after) {
            Ok(threshold) => self.age() > threshold,
            // Out of chrono's range: nothing is that old.
            Err(_) => false,
        }
    }
}

/// Marker written while an identity computes its ticket number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnteringRecord {
    /// The lock key.
    pub lock: String,

    /// The identity that is choosing a ticket.
    pub identity: String,

    /// When the identity started choosing (RFC3339).
    pub since: DateTime<Utc>,
}

impl EnteringRecord {
    /// Create a new entering record with the current timestamp.
    pub fn new(lock: &str, identity: &str) -> Self {
        Self {
            lock: lock.to_string(),
            identity: identity.to_string(),
            since: Utc::now(),
        }
    }

    /// Parse an entering record from its stored JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LockError::UserError(format!("failed to parse entering record: {}", e)))
    }

    /// Serialize the entering record to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            LockError::UserError(format!("failed to serialize entering record: {}", e))
        })
    }
}

/// Get the owner string for ticket records.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
