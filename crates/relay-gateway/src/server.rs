//! HTTP server: router assembly, identity extraction, graceful shutdown.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use chrono::Utc;
use relay_core::{Caller, RequestContext, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::procedures::ProcedureRegistry;
use crate::state::Gateway;
use crate::wire;

/// Header carrying the BYOK unlock secret for the request scope.
const UNLOCK_HEADER: &str = "x-unlock-secret";

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    /// The assembled gateway.
    pub gateway: Arc<Gateway>,
    /// The procedure set served by every wire.
    pub procedures: Arc<ProcedureRegistry>,
}

/// Build the per-request context from transport headers.
pub(crate) fn context_from_headers(gateway: &Gateway, headers: &HeaderMap) -> RequestContext {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let identity = gateway.authenticator.identify(bearer);

    let byok_unlock = headers
        .get(UNLOCK_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(SecretString::new);

    let deadline = Utc::now()
        + chrono::Duration::from_std(gateway.request_deadline())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

    RequestContext {
        request_id: Uuid::new_v4(),
        caller: identity.user.map_or(Caller::Anonymous, Caller::User),
        is_admin: identity.is_admin,
        byok_unlock,
        cancel: CancellationToken::new(),
        deadline: Some(deadline),
    }
}

/// Build the axum router serving all three wires.
#[must_use]
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    let state = AppState {
        gateway,
        procedures: Arc::new(ProcedureRegistry::standard()),
    };
    Router::new()
        .route("/rpc", post(wire::jsonrpc::handle))
        .route(
            "/trpc/{procedure}",
            post(wire::trpc::handle_mutation).get(wire::trpc::handle_query),
        )
        .route("/mcp", post(wire::mcp::handle))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "ok": true,
        "registry": state.gateway.registry.health(),
    }))
}

/// Run the gateway: bind, spawn background tasks, serve until `shutdown`
/// cancels (or Ctrl-C), then stop the background tasks.
///
/// # Errors
///
/// Returns an error when the listen address cannot be bound or the
/// server fails.
pub async fn serve(gateway: Arc<Gateway>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = gateway.config.server.listen.parse()?;
    let background = gateway.spawn_background(&shutdown);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, build_router(gateway))
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = signal_token.cancelled() => {},
                _ = tokio::signal::ctrl_c() => {},
            }
        })
        .await?;

    shutdown.cancel();
    for task in background {
        let _ = task.await;
    }
    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_with_token() -> Gateway {
        let config = relay_config::from_str(
            r#"
            [auth]
            tokens = { "tok-alice" = "alice@example.com" }
            admin_tokens = ["tok-admin"]
            "#,
        )
        .unwrap();
        Gateway::from_config(config)
    }

    #[test]
    fn test_context_from_headers_authenticated() {
        let gateway = gateway_with_token();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer tok-alice".parse().unwrap(),
        );
        headers.insert(UNLOCK_HEADER, "pw".parse().unwrap());

        let ctx = context_from_headers(&gateway, &headers);
        assert_eq!(ctx.require_user().unwrap().as_str(), "alice@example.com");
        assert!(!ctx.is_admin);
        assert_eq!(ctx.byok_unlock.unwrap().expose(), "pw");
        assert!(ctx.deadline.is_some());
    }

    #[test]
    fn test_context_from_headers_anonymous() {
        let gateway = gateway_with_token();
        let ctx = context_from_headers(&gateway, &HeaderMap::new());
        assert!(!ctx.caller.is_authenticated());
        assert!(ctx.byok_unlock.is_none());
    }
}
