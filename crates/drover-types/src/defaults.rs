//! Default configuration values shared across crates.

use std::time::Duration;

/// Site id reported on created attempts.
pub const SITE_ID: i32 = 0;
/// Advisory ceiling on simultaneously active attempts.
pub const MAX_ACTIVE_ATTEMPTS: u64 = 100_000;
/// Largest serialized session-parameter document accepted on submission.
pub const MAX_PARAMS_BYTES: usize = 1024 * 1024; // 1 MiB
/// Longest workflow name or retry name accepted on submission.
pub const MAX_NAME_LENGTH: usize = 255;

/// Status table used by the exactly-once guard.
pub const STATUS_TABLE: &str = "__drover_status";
/// Retention window for completed status rows.
pub const STATUS_TABLE_CLEANUP_SECS: u64 = 24 * 60 * 60;

/// First polling interval after a lock conflict.
pub const INITIAL_POLL_INTERVAL_SECS: u64 = 1;
/// Largest polling interval after repeated lock conflicts.
pub const MAX_POLL_INTERVAL_SECS: u64 = 1200;

pub fn status_table_cleanup() -> Duration {
    Duration::from_secs(STATUS_TABLE_CLEANUP_SECS)
}

pub fn initial_poll_interval() -> Duration {
    Duration::from_secs(INITIAL_POLL_INTERVAL_SECS)
}

pub fn max_poll_interval() -> Duration {
    Duration::from_secs(MAX_POLL_INTERVAL_SECS)
}
