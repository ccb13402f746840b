//! Error types for the sync-core crate.

use thiserror::Error;

/// Result type alias for sync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by domain-level validation and the clock/resolver algebra.
#[derive(Debug, Error)]
pub enum Error {
    /// A field on a `Task` or `Comment` violated a size/cardinality invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// A conflict record referenced an entity kind it has no policy for.
    #[error("unsupported entity kind for conflict resolution: {0}")]
    UnsupportedEntityKind(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
