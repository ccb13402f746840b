//! Server-side error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict on entity")]
    VersionConflict,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] sync_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] sync_core::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Maps to the wire error codes returned in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    VersionConflict,
    RateLimited,
    Internal,
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::VersionConflict => ErrorCode::VersionConflict,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Storage(_) | Self::Core(_) | Self::Json(_) => ErrorCode::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.code() {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::VersionConflict => 409,
            ErrorCode::RateLimited => 429,
            ErrorCode::Internal => 500,
        }
    }
}
