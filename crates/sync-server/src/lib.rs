//! Server-side sync handlers: pull delta queries, push batch processing and
//! field-level conflict resolution, manual conflict resolution, rate
//! limiting, the org vector-clock cache, and tombstone GC scheduling.

pub mod auth;
pub mod conflict_resolve;
pub mod dto;
pub mod error;
pub mod org_clock_cache;
pub mod pull;
pub mod push;
pub mod rate_limit;
pub mod tombstone_job;

pub use auth::{AuthContext, StubTokenValidator, TokenValidator};
pub use error::{ErrorCode, Result, ServerError};
pub use org_clock_cache::OrgClockCache;
pub use rate_limit::{RateLimitedOp, RateLimiter};
