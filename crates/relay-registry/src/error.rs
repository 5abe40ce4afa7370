//! Registry error types.

use thiserror::Error;

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The provider is not in the current snapshot.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The model is not in the provider's catalog and no default applies.
    #[error("no model resolvable for provider {provider}")]
    NoModel {
        /// The provider that lacked a model.
        provider: String,
    },

    /// The live catalog endpoint failed.
    #[error("catalog fetch failed: {0}")]
    Fetch(String),

    /// The live catalog document did not parse.
    #[error("catalog document invalid: {0}")]
    InvalidDocument(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
