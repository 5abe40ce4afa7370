//! Storage error types.

use thiserror::Error;

/// Errors from a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unavailable or connection lost.
    #[error("storage connection error: {0}")]
    Connection(String),

    /// A write was rejected because the row changed underneath it.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    /// Serialization of a stored value failed.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
