//! Config file loading.

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::types::GatewayConfig;
use crate::validate;

/// Load and validate a config file. A missing `path` yields the defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if
/// validation fails.
pub fn load(path: Option<&Path>) -> ConfigResult<GatewayConfig> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let config: GatewayConfig =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            info!(path = %path.display(), "Loaded gateway config");
            config
        },
        None => GatewayConfig::default(),
    };

    validate::validate(&config)?;
    Ok(config)
}

/// Parse and validate config from a TOML string.
///
/// # Errors
///
/// Returns a [`ConfigError`] on parse or validation failure.
pub fn from_str(contents: &str) -> ConfigResult<GatewayConfig> {
    let config: GatewayConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: "<inline>".to_string(),
        source,
    })?;
    validate::validate(&config)?;
    Ok(config)
}
