//! Size limits, retry budgets, and other magic numbers shared across crates.

use chrono::Duration;

pub const TITLE_MAX_LEN: usize = 500;
pub const DESCRIPTION_MAX_LEN: usize = 10_000;
pub const TAG_MAX_LEN: usize = 50;
pub const TAGS_MAX_COUNT: usize = 20;

/// Ordinary outbox entries are permanently failed after this many attempts.
pub const OUTBOX_MAX_RETRIES_ORDINARY: i32 = 3;
/// Permission-denied (403) outbox entries are never retried.
pub const OUTBOX_MAX_RETRIES_PERMISSION_DENIED: i32 = 1;

pub const PULL_DEFAULT_LIMIT: i64 = 100;
pub const PULL_MAX_LIMIT: i64 = 500;

pub const PUSH_MAX_BATCH: usize = 100;
/// Safety cap on paginated pull recursion within one sync cycle, so a
/// pathologically large backlog can't starve the push phase forever.
pub const MAX_PULL_PAGES: u32 = 20;

pub const TOMBSTONE_TTL_DAYS: i64 = 90;

pub fn tombstone_ttl() -> Duration {
    Duration::days(TOMBSTONE_TTL_DAYS)
}

/// Device-side sync coordinator cadence.
pub const PERIODIC_SYNC_INTERVAL_SECS: u64 = 30;
/// Debounce window after a local mutation before a sync cycle is triggered.
pub const DEBOUNCE_MUTATION_SECS: u64 = 2;
/// Network call timeout.
pub const NETWORK_TIMEOUT_SECS: u64 = 30;

/// Storage quota thresholds.
pub const STORAGE_WARNING_THRESHOLD_PCT: f64 = 0.80;
pub const STORAGE_CRITICAL_THRESHOLD_PCT: f64 = 0.95;
/// Synced entities older than this are eligible for quota-triggered cleanup.
pub const STORAGE_CLEANUP_AGE_DAYS: i64 = 90;

/// Rate limits, requests per minute per user.
pub const PULL_RATE_LIMIT_PER_MIN: u32 = 120;
pub const PUSH_RATE_LIMIT_PER_MIN: u32 = 60;
pub const CONFLICT_RESOLVE_RATE_LIMIT_PER_MIN: u32 = 30;
