//! LockConfig struct definition and default implementation.

use serde::{Deserialize, Serialize};

/// Default time a blocker may hold up a waiter before it is presumed crashed.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default delay between two evaluations of the wait loop.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Timing configuration for a shared lock.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Milliseconds a blocking ticket may stay unchanged before a waiter
    /// force-clears it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Milliseconds between two scans of the shared storage while waiting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
