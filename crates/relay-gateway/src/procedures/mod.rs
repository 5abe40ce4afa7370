//! The abstract procedure registry.
//!
//! Procedures are declared once - name, auth flag, mutation flag, rate
//! class, handler over JSON values - and the three wire shells in
//! [`crate::wire`] are generated from this registry. Dispatch applies the
//! cross-cutting policies in order: rate limiting (per identity and
//! procedure class), authentication, operator gating, then the handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use relay_core::{GatewayError, GatewayResult, RequestContext};
use serde_json::Value;
use tracing::debug;

use crate::state::Gateway;

pub(crate) use crate::ratelimit::RateClass;

mod admin;
mod ai;
mod auth_ns;
mod billing;
pub(crate) mod mcp_ns;
mod system;
mod user_ns;

/// Type-erased procedure handler.
type BoxedHandler =
    Arc<dyn Fn(Arc<Gateway>, RequestContext, Value) -> BoxFuture<'static, GatewayResult<Value>> + Send + Sync>;

/// One registered procedure.
#[derive(Clone)]
pub struct Procedure {
    /// Dotted name, e.g. `ai.generateText`.
    pub name: &'static str,
    /// One-line description (surfaced as the MCP tool description).
    pub description: &'static str,
    /// Whether an authenticated caller is required.
    pub auth_required: bool,
    /// Whether an operator token is required.
    pub admin_only: bool,
    /// Mutations go over POST on the typed-RPC wire; queries over GET.
    pub mutation: bool,
    /// Cost class for rate limiting.
    pub rate_class: RateClass,
    handler: BoxedHandler,
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("auth_required", &self.auth_required)
            .finish_non_exhaustive()
    }
}

/// The full procedure set.
pub struct ProcedureRegistry {
    procedures: BTreeMap<&'static str, Procedure>,
}

impl ProcedureRegistry {
    /// The standard surface: `ai`, `auth`, `billing`, `system`, `admin`,
    /// `user`, and `mcp` namespaces.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self {
            procedures: BTreeMap::new(),
        };
        ai::register(&mut registry);
        auth_ns::register(&mut registry);
        billing::register(&mut registry);
        system::register(&mut registry);
        admin::register(&mut registry);
        user_ns::register(&mut registry);
        mcp_ns::register(&mut registry);
        registry
    }

    pub(crate) fn add(&mut self, procedure: Procedure) {
        debug_assert!(
            !self.procedures.contains_key(procedure.name),
            "duplicate procedure {}",
            procedure.name
        );
        self.procedures.insert(procedure.name, procedure);
    }

    /// Look up a procedure.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    /// All procedures, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }

    /// Dispatch one call.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown procedures; `RateLimited`,
    /// `Unauthenticated`, or `Forbidden` from the cross-cutting checks;
    /// otherwise whatever the handler returns.
    pub async fn dispatch(
        &self,
        gateway: Arc<Gateway>,
        ctx: RequestContext,
        name: &str,
        params: Value,
    ) -> GatewayResult<Value> {
        let procedure = self
            .get(name)
            .ok_or_else(|| GatewayError::InvalidArgument(format!("unknown procedure: {name}")))?;

        let identity = ctx
            .caller
            .user_id()
            .map_or_else(|| "anonymous".to_string(), ToString::to_string);
        if let Err(retry_after_secs) = gateway.rate.check(&identity, procedure.rate_class) {
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        // An operator token satisfies the auth requirement on its own;
        // operator-only procedures are gated on the admin flag below.
        if procedure.auth_required && !ctx.caller.is_authenticated() && !ctx.is_admin {
            return Err(GatewayError::Unauthenticated(format!(
                "{name} requires authentication"
            )));
        }
        if procedure.admin_only && !ctx.is_admin {
            return Err(GatewayError::Forbidden {
                reason: format!("{name} requires an operator token"),
            });
        }

        if let Some(user) = ctx.caller.user_id() {
            gateway.ensure_user(user).await?;
        }

        debug!(procedure = name, request = %ctx.request_id, "Dispatching");
        (procedure.handler)(gateway, ctx, params).await
    }
}

impl std::fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("count", &self.procedures.len())
            .finish()
    }
}

/// Parse procedure input. `null`/absent params are accepted as the empty
/// record so "void" procedures tolerate both spellings.
pub(crate) fn parse_input<I: serde::de::DeserializeOwned>(params: Value) -> GatewayResult<I> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| GatewayError::InvalidArgument(format!("invalid input: {e}")))
}

/// Wrap a typed async handler into a [`BoxedHandler`].
pub(crate) fn wrap<I, O, F, Fut>(f: F) -> BoxedHandler
where
    I: serde::de::DeserializeOwned + Send + 'static,
    O: serde::Serialize + 'static,
    F: Fn(Arc<Gateway>, RequestContext, I) -> Fut + Send + Sync + Copy + 'static,
    Fut: std::future::Future<Output = GatewayResult<O>> + Send + 'static,
{
    Arc::new(move |gateway, ctx, params| {
        Box::pin(async move {
            let input: I = parse_input(params)?;
            let output = f(gateway, ctx, input).await?;
            serde_json::to_value(output).map_err(|e| GatewayError::Internal(e.to_string()))
        })
    })
}

/// Empty input for void procedures.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_namespace() {
        let registry = ProcedureRegistry::standard();
        for namespace in ["ai", "auth", "billing", "system", "admin", "user", "mcp"] {
            assert!(
                registry
                    .iter()
                    .any(|p| p.name.starts_with(&format!("{namespace}."))),
                "no procedures registered under {namespace}"
            );
        }
        assert!(registry.get("ai.generateText").is_some());
        assert!(registry.get("ai.generateText").unwrap().auth_required);
    }

    #[tokio::test]
    async fn test_unknown_procedure_is_invalid_argument() {
        let registry = ProcedureRegistry::standard();
        let gateway = Arc::new(Gateway::from_config(relay_config::GatewayConfig::default()));
        let err = registry
            .dispatch(
                gateway,
                RequestContext::anonymous(),
                "nope.nothing",
                Value::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_auth_required_rejects_anonymous() {
        let registry = ProcedureRegistry::standard();
        let gateway = Arc::new(Gateway::from_config(relay_config::GatewayConfig::default()));
        let err = registry
            .dispatch(
                gateway,
                RequestContext::anonymous(),
                "billing.getTokenBalance",
                Value::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_admin_only_rejects_plain_users() {
        let registry = ProcedureRegistry::standard();
        let gateway = Arc::new(Gateway::from_config(relay_config::GatewayConfig::default()));
        let ctx = RequestContext::for_user(relay_core::UserId::new("u1"));
        let err = registry
            .dispatch(gateway, ctx, "admin.getConfig", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden { .. }));
    }

    /// A standalone operator token carries no user identity; it must still
    /// reach operator procedures.
    #[tokio::test]
    async fn test_operator_token_reaches_admin_procedures() {
        let registry = ProcedureRegistry::standard();
        let gateway = Arc::new(Gateway::from_config(relay_config::GatewayConfig::default()));
        let mut ctx = RequestContext::anonymous();
        ctx.is_admin = true;

        let config = registry
            .dispatch(gateway.clone(), ctx.clone(), "admin.getConfig", Value::Null)
            .await
            .unwrap();
        assert_eq!(config["maxMaxTokens"], 8192);

        let status = registry
            .dispatch(gateway, ctx, "admin.status", Value::Null)
            .await
            .unwrap();
        assert_eq!(status["version"], env!("CARGO_PKG_VERSION"));
    }
}
