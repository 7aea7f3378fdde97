//! Exit code constants for the `bakery-lock` CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, bad config, missing ticket)
//! - 2: Storage failure (probe failed or storage dropped while acquiring)
//! - 3: The child of `bakery-lock run` was terminated by a signal
//!
//! `bakery-lock run` passes the child's own exit code through unchanged.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid config, or an unknown ticket.
pub const USER_ERROR: i32 = 1;

/// Storage failure: the backing store is unusable or stopped persisting.
pub const STORAGE_FAILURE: i32 = 2;

/// The child command ended without an exit code (killed by a signal).
pub const CHILD_TERMINATED: i32 = 3;
