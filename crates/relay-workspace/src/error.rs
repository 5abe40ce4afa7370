//! Workspace error types.

use thiserror::Error;

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Containment or path-policy violation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No workspace registered under that id.
    #[error("unknown workspace: {0}")]
    UnknownWorkspace(String),

    /// Write attempted against a read-only workspace.
    #[error("workspace {0} is read-only")]
    ReadOnly(String),

    /// File exceeds the workspace size cap.
    #[error("file too large: {size} bytes exceeds cap of {max}")]
    TooLarge {
        /// Observed size.
        size: u64,
        /// Configured cap.
        max: u64,
    },

    /// Registration conflict.
    #[error("workspace conflict: {0}")]
    Conflict(String),

    /// Content was not valid for the requested encoding.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Underlying filesystem failure.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
