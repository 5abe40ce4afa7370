//! Post-parse configuration validation.

use globset::Glob;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{GatewayConfig, RawProviderEntry};

/// Safety margin required between the request deadline and the
/// reservation TTL, seconds. An orphaned reservation must outlive the
/// slowest request that could still settle it.
const RESERVATION_MARGIN_SECS: u64 = 30;

/// Validate a parsed configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &GatewayConfig) -> ConfigResult<()> {
    validate_server(config)?;
    validate_limits(config)?;
    validate_ledger(config)?;
    validate_providers(config)?;
    validate_workspaces(config)?;
    Ok(())
}

fn validate_server(config: &GatewayConfig) -> ConfigResult<()> {
    if config.server.listen.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Validation {
            field: "server.listen".to_string(),
            message: format!("'{}' is not a socket address", config.server.listen),
        });
    }
    if config.server.request_deadline_secs == 0 {
        return Err(ConfigError::Validation {
            field: "server.request_deadline_secs".to_string(),
            message: "must be nonzero".to_string(),
        });
    }
    Ok(())
}

fn validate_limits(config: &GatewayConfig) -> ConfigResult<()> {
    let limits = &config.limits;
    if limits.default_max_tokens == 0 || limits.max_max_tokens == 0 {
        return Err(ConfigError::Validation {
            field: "limits.max_tokens".to_string(),
            message: "token caps must be nonzero".to_string(),
        });
    }
    if limits.default_max_tokens > limits.max_max_tokens {
        return Err(ConfigError::Validation {
            field: "limits.default_max_tokens".to_string(),
            message: format!(
                "default {} exceeds ceiling {}",
                limits.default_max_tokens, limits.max_max_tokens
            ),
        });
    }
    Ok(())
}

fn validate_ledger(config: &GatewayConfig) -> ConfigResult<()> {
    let ledger = &config.ledger;
    let floor = config
        .server
        .request_deadline_secs
        .saturating_add(RESERVATION_MARGIN_SECS);
    if ledger.reservation_ttl_secs <= floor {
        return Err(ConfigError::Validation {
            field: "ledger.reservation_ttl_secs".to_string(),
            message: format!(
                "must exceed request deadline + {RESERVATION_MARGIN_SECS}s margin ({floor}s)"
            ),
        });
    }
    if ledger.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation {
            field: "ledger.sweep_interval_secs".to_string(),
            message: "must be nonzero".to_string(),
        });
    }
    if !(0.0..1.0).contains(&ledger.platform_fee_rate) {
        return Err(ConfigError::Validation {
            field: "ledger.platform_fee_rate".to_string(),
            message: "must be in [0, 1)".to_string(),
        });
    }
    Ok(())
}

fn validate_providers(config: &GatewayConfig) -> ConfigResult<()> {
    let Some(entries) = &config.providers else {
        return Ok(());
    };
    for entry in entries {
        let RawProviderEntry::Full(table) = entry else {
            continue;
        };
        if table.name.is_empty() {
            return Err(ConfigError::Validation {
                field: "providers[].name".to_string(),
                message: "must be non-empty".to_string(),
            });
        }
        if let Some(kind) = &table.kind
            && !matches!(kind.as_str(), "anthropic" | "openai" | "google" | "mock")
        {
            return Err(ConfigError::Validation {
                field: format!("providers[{}].type", table.name),
                message: format!(
                    "unknown adapter kind '{kind}'; expected anthropic, openai, google, or mock"
                ),
            });
        }
        for pattern in table
            .model_restrictions
            .allowed_models
            .iter()
            .chain(&table.model_restrictions.blocked_models)
        {
            if Glob::new(pattern).is_err() {
                return Err(ConfigError::Validation {
                    field: format!("providers[{}].model_restrictions", table.name),
                    message: format!("invalid glob '{pattern}'"),
                });
            }
        }
    }
    Ok(())
}

fn validate_workspaces(config: &GatewayConfig) -> ConfigResult<()> {
    let mut seen = std::collections::HashSet::new();
    for ws in &config.workspaces {
        if ws.id.is_empty() {
            return Err(ConfigError::Validation {
                field: "workspaces[].id".to_string(),
                message: "must be non-empty".to_string(),
            });
        }
        if !seen.insert(ws.id.clone()) {
            return Err(ConfigError::Validation {
                field: format!("workspaces[{}]", ws.id),
                message: "duplicate workspace id".to_string(),
            });
        }
        if !ws.root.is_absolute() {
            return Err(ConfigError::Validation {
                field: format!("workspaces[{}].root", ws.id),
                message: "root must be an absolute path".to_string(),
            });
        }
        for pattern in ws.allow.iter().chain(&ws.block) {
            if Glob::new(pattern).is_err() {
                return Err(ConfigError::Validation {
                    field: format!("workspaces[{}]", ws.id),
                    message: format!("invalid glob '{pattern}'"),
                });
            }
        }
        if ws.max_file_size == 0 || ws.max_entries == 0 {
            return Err(ConfigError::Validation {
                field: format!("workspaces[{}]", ws.id),
                message: "max_file_size and max_entries must be nonzero".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_str;

    #[test]
    fn test_ttl_must_exceed_deadline_plus_margin() {
        let err = from_str(
            r"
            [server]
            request_deadline_secs = 300

            [ledger]
            reservation_ttl_secs = 300
            ",
        )
        .unwrap_err();
        assert!(err.to_string().contains("reservation_ttl_secs"));
    }

    #[test]
    fn test_default_above_ceiling_rejected() {
        let err = from_str(
            r"
            [limits]
            default_max_tokens = 9000
            max_max_tokens = 8192
            ",
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_max_tokens"));
    }

    #[test]
    fn test_unknown_adapter_kind_rejected() {
        let err = from_str(
            r#"
            providers = [{ name = "x", type = "grpc" }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("grpc"));
    }

    #[test]
    fn test_relative_workspace_root_rejected() {
        let err = from_str(
            r#"
            [[workspaces]]
            id = "w"
            root = "relative/path"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_duplicate_workspace_id_rejected() {
        let err = from_str(
            r#"
            [[workspaces]]
            id = "w"
            root = "/srv/a"

            [[workspaces]]
            id = "w"
            root = "/srv/b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
