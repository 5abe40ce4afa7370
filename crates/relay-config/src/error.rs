//! Configuration error types.

use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A field is out of range or a cross-field invariant does not hold.
    #[error("invalid config value for {field}: {message}")]
    Validation {
        /// The offending field, dotted path form.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
