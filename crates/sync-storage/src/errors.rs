//! Storage-layer error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("write actor is no longer running")]
    WriterGone,

    #[error(transparent)]
    Core(#[from] sync_core::Error),
}
