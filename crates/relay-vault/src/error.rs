//! Vault error types.

use thiserror::Error;

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Wrong unlock secret or no such entry. Deliberately one variant:
    /// distinguishing them would hand an attacker an existence oracle.
    #[error("decryption failed")]
    DecryptFailed,

    /// Key derivation rejected its parameters.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Encryption failed (never expected with valid parameters).
    #[error("encryption failed")]
    Encrypt,

    /// Backing store failure.
    #[error(transparent)]
    Storage(#[from] relay_storage::StorageError),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
