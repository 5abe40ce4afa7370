//! Credential resolution: inline → BYOK → server → reject.
//!
//! Runs strictly after policy admission, so a forbidden request is never
//! unlocked. The resolved key moves through the pipeline as a
//! [`SecretString`] and is never logged or echoed; only the source tag is
//! observable.

use relay_core::{GatewayError, GatewayResult, RequestContext, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::from_vault;
use crate::state::Gateway;

/// Where the effective credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Supplied inline on the request; never persisted.
    Inline,
    /// Unlocked from the user's vault entry.
    Byok,
    /// The server's configured key.
    Server,
}

/// A resolved credential, scoped to one request.
pub struct ResolvedCredential {
    /// The key material.
    pub key: SecretString,
    /// Source tag, surfaced in `usageInfo`.
    pub source: CredentialSource,
}

impl ResolvedCredential {
    /// Whether the caller brought their own key (inline or BYOK) - such
    /// traffic is never metered against the server balance.
    #[must_use]
    pub fn has_own_key(&self) -> bool {
        matches!(self.source, CredentialSource::Inline | CredentialSource::Byok)
    }
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Resolve the effective credential for a request.
///
/// Order:
/// 1. an inline `apiKey` on the request wins
/// 2. an authenticated caller's vault entry, when present and an unlock
///    secret accompanies the request (a present entry without an unlock
///    secret falls through rather than failing)
/// 3. the server's configured key
/// 4. otherwise [`GatewayError::NoCredential`]
///
/// # Errors
///
/// [`GatewayError::DecryptAuthFailed`] when a vault unlock was attempted
/// with a wrong secret; [`GatewayError::NoCredential`] when nothing
/// resolves.
pub async fn resolve_credential(
    gateway: &Gateway,
    ctx: &RequestContext,
    provider: &str,
    inline_key: Option<SecretString>,
) -> GatewayResult<ResolvedCredential> {
    if let Some(key) = inline_key {
        debug!(provider = %provider, source = "inline", "Resolved credential");
        return Ok(ResolvedCredential {
            key,
            source: CredentialSource::Inline,
        });
    }

    if let Some(user) = ctx.caller.user_id() {
        let status = gateway
            .vault
            .status(user, provider)
            .await
            .map_err(from_vault)?;
        if status.present
            && let Some(unlock) = &ctx.byok_unlock
        {
            let key = gateway
                .vault
                .unlock(user, provider, unlock)
                .await
                .map_err(from_vault)?;
            debug!(provider = %provider, source = "byok", "Resolved credential");
            return Ok(ResolvedCredential {
                key,
                source: CredentialSource::Byok,
            });
        }
    }

    if let Some(key) = gateway.server_key(provider) {
        debug!(provider = %provider, source = "server", "Resolved credential");
        return Ok(ResolvedCredential {
            key: key.clone(),
            source: CredentialSource::Server,
        });
    }

    Err(GatewayError::NoCredential {
        provider: provider.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::UserId;

    fn gateway(config: &str) -> Gateway {
        Gateway::from_config(relay_config::from_str(config).unwrap())
    }

    async fn store_byok(gateway: &Gateway, user: &UserId, provider: &str, key: &str, pw: &str) {
        gateway
            .vault
            .store(user, provider, &SecretString::new(key), &SecretString::new(pw))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inline_key_wins() {
        let gateway = gateway(r#"providers = [{ name = "anthropic", api_key = "srv" }]"#);
        let ctx = RequestContext::for_user(UserId::new("u1"));
        let resolved = resolve_credential(
            &gateway,
            &ctx,
            "anthropic",
            Some(SecretString::new("inline-key")),
        )
        .await
        .unwrap();
        assert_eq!(resolved.source, CredentialSource::Inline);
        assert_eq!(resolved.key.expose(), "inline-key");
        assert!(resolved.has_own_key());
    }

    #[tokio::test]
    async fn test_byok_beats_server_key() {
        let gateway = gateway(r#"providers = [{ name = "anthropic", api_key = "srv" }]"#);
        let user = UserId::new("u1");
        store_byok(&gateway, &user, "anthropic", "user-key", "pw").await;

        let ctx = RequestContext::for_user(user).with_unlock(SecretString::new("pw"));
        let resolved = resolve_credential(&gateway, &ctx, "anthropic", None)
            .await
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Byok);
        assert_eq!(resolved.key.expose(), "user-key");
    }

    #[tokio::test]
    async fn test_byok_without_unlock_falls_through_to_server() {
        let gateway = gateway(r#"providers = [{ name = "anthropic", api_key = "srv" }]"#);
        let user = UserId::new("u1");
        store_byok(&gateway, &user, "anthropic", "user-key", "pw").await;

        let ctx = RequestContext::for_user(user);
        let resolved = resolve_credential(&gateway, &ctx, "anthropic", None)
            .await
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Server);
        assert!(!resolved.has_own_key());
    }

    #[tokio::test]
    async fn test_wrong_unlock_secret_errors_rather_than_falling_through() {
        let gateway = gateway(r#"providers = [{ name = "anthropic", api_key = "srv" }]"#);
        let user = UserId::new("u1");
        store_byok(&gateway, &user, "anthropic", "user-key", "pw").await;

        let ctx = RequestContext::for_user(user).with_unlock(SecretString::new("wrong"));
        let err = resolve_credential(&gateway, &ctx, "anthropic", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DecryptAuthFailed));
    }

    #[tokio::test]
    #[allow(unsafe_code)]
    async fn test_no_credential_anywhere() {
        // SAFETY: tests run single-threaded w.r.t. this var's consumers in this process;
        // ensure no ambient env key leaks into the "no credential anywhere" scenario.
        let prev = std::env::var("ANTHROPIC_API_KEY").ok();
        unsafe {
            std::env::remove_var("ANTHROPIC_API_KEY");
        }

        let gateway = gateway(r#"providers = ["anthropic"]"#);
        // No env key in tests, no BYOK, no inline.
        let ctx = RequestContext::for_user(UserId::new("u1"));
        let result = resolve_credential(&gateway, &ctx, "anthropic", None).await;

        if let Some(val) = prev {
            unsafe {
                std::env::set_var("ANTHROPIC_API_KEY", val);
            }
        }

        match result {
            Err(GatewayError::NoCredential { provider }) => assert_eq!(provider, "anthropic"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
