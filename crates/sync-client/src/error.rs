//! Error types for the sync client crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncClientError>;

/// Retry policy class for a push/pull API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    /// Leave entries in the outbox; retried next cycle (429, 5xx).
    Retryable,
    /// Mark affected entries permanently denied; do not retry (403).
    PermissionDenied,
    /// Refresh the auth token and retry the request once (401).
    ReauthRequired,
    /// Not retriable and not a permission issue (4xx other than 401/403/429).
    Permanent,
}

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(#[from] sync_storage::StorageError),

    #[error("authentication error: {0}")]
    Auth(String),
}

impl SyncClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify for the push/pull cycle's response-handling branch.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 => ApiRetryClass::ReauthRequired,
                403 => ApiRetryClass::PermissionDenied,
                429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(e) if e.is_timeout() || e.is_connect() => ApiRetryClass::Retryable,
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Timeout(_) => ApiRetryClass::Retryable,
            Self::Json(_) => ApiRetryClass::Permanent,
            Self::Storage(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_distinguishes_401_and_403() {
        assert_eq!(
            SyncClientError::api(401, "expired").retry_class(),
            ApiRetryClass::ReauthRequired
        );
        assert_eq!(
            SyncClientError::api(403, "forbidden").retry_class(),
            ApiRetryClass::PermissionDenied
        );
    }

    #[test]
    fn retry_class_for_429_and_5xx_is_retryable() {
        assert_eq!(SyncClientError::api(429, "slow down").retry_class(), ApiRetryClass::Retryable);
        assert_eq!(SyncClientError::api(503, "down").retry_class(), ApiRetryClass::Retryable);
    }
}
