//! Wire shells.
//!
//! Three transports share the one [`ProcedureRegistry`]; each module here
//! is a thin codec over `dispatch`:
//!
//! - [`jsonrpc`] - JSON-RPC 2.0 at `POST /rpc`
//! - [`trpc`] - typed-procedure RPC at `POST|GET /trpc/{proc}`
//! - [`mcp`] - MCP framing at `POST /mcp`
//!
//! [`ProcedureRegistry`]: crate::procedures::ProcedureRegistry

use relay_core::GatewayError;

pub mod jsonrpc;
pub mod mcp;
pub mod trpc;

/// HTTP status for an error kind (used by the typed-RPC wire; the
/// JSON-RPC and MCP wires always answer 200 with an in-band error).
#[must_use]
pub fn http_status(error: &GatewayError) -> u16 {
    match error {
        GatewayError::InvalidArgument(_) | GatewayError::InvalidPath(_) => 400,
        GatewayError::Unauthenticated(_) => 401,
        GatewayError::InsufficientBalance { .. } => 402,
        GatewayError::Forbidden { .. }
        | GatewayError::NoCredential { .. }
        | GatewayError::DecryptAuthFailed => 403,
        GatewayError::Conflict(_) => 409,
        GatewayError::RateLimited { .. } => 429,
        GatewayError::Upstream { .. } => 502,
        GatewayError::Internal(_) => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(http_status(&GatewayError::InvalidArgument("x".into())), 400);
        assert_eq!(
            http_status(&GatewayError::InsufficientBalance {
                required: 1,
                available: 0
            }),
            402
        );
        assert_eq!(
            http_status(&GatewayError::RateLimited {
                retry_after_secs: 1
            }),
            429
        );
        assert_eq!(http_status(&GatewayError::Internal("x".into())), 500);
    }
}
