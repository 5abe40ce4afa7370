//! User-visible error taxonomy for gateway operations.
//!
//! Component crates keep their own error enums; the dispatch layer converts
//! them into [`GatewayError`] so that all three wire protocols report the
//! same kinds with the same codes.

use thiserror::Error;

/// Classification of provider adapter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamErrorKind {
    /// The provider rejected the credential.
    Auth,
    /// The provider returned 429.
    RateLimited,
    /// The provider rejected the request shape.
    BadRequest,
    /// The provider returned a 5xx.
    ServerError,
    /// The upstream call exceeded its deadline.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
}

impl UpstreamErrorKind {
    /// Stable string form used in wire payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimited => "rateLimited",
            Self::BadRequest => "badRequest",
            Self::ServerError => "serverError",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors surfaced to gateway callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Schema or bounds violation at input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or invalid identity on an auth-required procedure.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Policy rejection (provider or model not allowed).
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Why admission was denied.
        reason: String,
    },

    /// The credential resolver found no usable key.
    #[error("no credential available for provider {provider}")]
    NoCredential {
        /// The provider that lacked a credential.
        provider: String,
    },

    /// Reservation denied for lack of balance.
    #[error("insufficient balance: required {required} tokens, available {available}")]
    InsufficientBalance {
        /// Tokens the reservation needed.
        required: u64,
        /// Tokens actually available.
        available: u64,
    },

    /// Unlock secret wrong or entry missing (deliberately indistinguishable).
    #[error("decryption failed")]
    DecryptAuthFailed,

    /// Provider adapter failure.
    #[error("upstream {} error: {message}", kind.as_str())]
    Upstream {
        /// Failure classification.
        kind: UpstreamErrorKind,
        /// Provider-reported detail.
        message: String,
    },

    /// Local token bucket exhausted.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the bucket refills enough for one call.
        retry_after_secs: u64,
    },

    /// Workspace containment or policy violation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Concurrent modification of BYOK or workspace configuration.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage failure or invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable kind string used in wire payloads and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalidArgument",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::NoCredential { .. } => "noCredential",
            Self::InsufficientBalance { .. } => "insufficientBalance",
            Self::DecryptAuthFailed => "decryptAuthFailed",
            Self::Upstream { .. } => "upstream",
            Self::RateLimited { .. } => "rateLimited",
            Self::InvalidPath(_) => "invalidPath",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    /// JSON-RPC error code for this kind.
    ///
    /// `-32602`/`-32603` are the standard invalid-params/internal codes;
    /// the remaining kinds use the implementation-defined `-32000..-32099`
    /// server range.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -32602,
            Self::Internal(_) => -32603,
            Self::Unauthenticated(_) => -32000,
            Self::Forbidden { .. } => -32003,
            Self::NoCredential { .. } => -32004,
            Self::InsufficientBalance { .. } => -32005,
            Self::DecryptAuthFailed => -32006,
            Self::InvalidPath(_) => -32007,
            Self::Conflict(_) => -32009,
            Self::Upstream { .. } => -32010,
            Self::RateLimited { .. } => -32029,
        }
    }

    /// Structured detail payload attached to wire errors, if any.
    #[must_use]
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientBalance {
                required,
                available,
            } => Some(serde_json::json!({
                "required": required,
                "available": available,
            })),
            Self::Upstream { kind, .. } => Some(serde_json::json!({
                "upstreamKind": kind.as_str(),
            })),
            Self::RateLimited { retry_after_secs } => Some(serde_json::json!({
                "retryAfterSecs": retry_after_secs,
            })),
            _ => None,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::InsufficientBalance {
            required: 500,
            available: 100,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: required 500 tokens, available 100"
        );
        assert_eq!(err.kind(), "insufficientBalance");

        let err = GatewayError::Upstream {
            kind: UpstreamErrorKind::RateLimited,
            message: "429".to_string(),
        };
        assert_eq!(err.to_string(), "upstream rateLimited error: 429");
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            GatewayError::InvalidArgument("x".into()),
            GatewayError::Unauthenticated("x".into()),
            GatewayError::Forbidden { reason: "x".into() },
            GatewayError::NoCredential {
                provider: "x".into(),
            },
            GatewayError::InsufficientBalance {
                required: 1,
                available: 0,
            },
            GatewayError::DecryptAuthFailed,
            GatewayError::Upstream {
                kind: UpstreamErrorKind::Auth,
                message: "x".into(),
            },
            GatewayError::RateLimited {
                retry_after_secs: 1,
            },
            GatewayError::InvalidPath("x".into()),
            GatewayError::Conflict("x".into()),
            GatewayError::Internal("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(GatewayError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_insufficient_balance_detail() {
        let err = GatewayError::InsufficientBalance {
            required: 500,
            available: 100,
        };
        let detail = err.detail().unwrap();
        assert_eq!(detail["required"], 500);
        assert_eq!(detail["available"], 100);
    }
}
