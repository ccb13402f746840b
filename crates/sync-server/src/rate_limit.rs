//! Per-user token bucket rate limiting:
//! 120/min pull, 60/min push, 30/min conflict-resolve.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sync_core::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitedOp {
    Pull,
    Push,
    ConflictResolve,
}

impl RateLimitedOp {
    fn per_minute(self) -> u32 {
        match self {
            Self::Pull => sync_core::constants::PULL_RATE_LIMIT_PER_MIN,
            Self::Push => sync_core::constants::PUSH_RATE_LIMIT_PER_MIN,
            Self::ConflictResolve => sync_core::constants::CONFLICT_RESOLVE_RATE_LIMIT_PER_MIN,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// One bucket per (user, operation). Refilled continuously based on elapsed
/// time rather than on a fixed-minute boundary, so a burst right after a
/// minute rollover can't double a user's effective rate.
pub struct RateLimiter {
    buckets: Mutex<HashMap<(UserId, RateLimitedOp), Bucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Ok(())` if the request is allowed, or the number of seconds
    /// to wait before retrying.
    pub fn check(&self, user_id: &UserId, op: RateLimitedOp) -> Result<(), u64> {
        let capacity = op.per_minute() as f64;
        let refill_per_sec = capacity / 60.0;
        let now = Instant::now();

        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry((user_id.clone(), op))
            .or_insert_with(|| Bucket {
                tokens: capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / refill_per_sec);
            Err(wait.as_secs().max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_bucket_rejects_with_retry_after() {
        let limiter = RateLimiter::new();
        let user = UserId::new("u1");
        for _ in 0..sync_core::constants::CONFLICT_RESOLVE_RATE_LIMIT_PER_MIN {
            assert!(limiter.check(&user, RateLimitedOp::ConflictResolve).is_ok());
        }
        assert!(limiter.check(&user, RateLimitedOp::ConflictResolve).is_err());
    }

    #[test]
    fn separate_users_have_independent_buckets() {
        let limiter = RateLimiter::new();
        let a = UserId::new("a");
        let b = UserId::new("b");
        for _ in 0..sync_core::constants::PUSH_RATE_LIMIT_PER_MIN {
            limiter.check(&a, RateLimitedOp::Push).unwrap();
        }
        assert!(limiter.check(&a, RateLimitedOp::Push).is_err());
        assert!(limiter.check(&b, RateLimitedOp::Push).is_ok());
    }
}
