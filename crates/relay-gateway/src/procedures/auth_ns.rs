//! The `auth` namespace: BYOK key management.
//!
//! All procedures require authentication and operate on the caller's own
//! entries. `getUserKey` reports presence and timestamps only; the key
//! itself never appears in any output.

use std::sync::Arc;

use relay_core::{GatewayError, GatewayResult, RequestContext, SecretString};
use relay_llm::TextProvider;
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::{from_registry, from_vault};
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "auth.storeUserKey",
        description: "Store an encrypted provider key for the caller",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(store_user_key),
    });
    registry.add(Procedure {
        name: "auth.getUserKey",
        description: "Key status for a provider (presence and timestamps only)",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_user_key),
    });
    registry.add(Procedure {
        name: "auth.rotateUserKey",
        description: "Replace a stored provider key",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(rotate_user_key),
    });
    registry.add(Procedure {
        name: "auth.deleteUserKey",
        description: "Delete a stored provider key",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(delete_user_key),
    });
    registry.add(Procedure {
        name: "auth.validateUserKey",
        description: "Unlock a stored key and validate it upstream",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Expensive,
        handler: wrap(validate_user_key),
    });
    registry.add(Procedure {
        name: "auth.getUserProviders",
        description: "Providers the caller has stored keys for",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_user_providers),
    });
}

/// Whether policy permits BYOK material for a provider at all.
fn byok_permitted(gateway: &Gateway, provider: &str) -> bool {
    gateway.policy.byok_any
        || gateway.policy.allowed.contains(provider)
        || gateway.policy.byok_providers.contains(provider)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreKeyInput {
    /// Caller email; must match the authenticated identity when present.
    #[serde(default)]
    email: Option<String>,
    provider: String,
    api_key: SecretString,
    unlock_secret: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Stored {
    stored: bool,
}

fn check_email(ctx: &RequestContext, email: Option<&str>) -> GatewayResult<()> {
    if let Some(email) = email
        && let Some(user) = ctx.caller.user_id()
        && user.as_str() != email
    {
        return Err(GatewayError::Forbidden {
            reason: "email does not match the authenticated caller".to_string(),
        });
    }
    Ok(())
}

async fn store_user_key(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: StoreKeyInput,
) -> GatewayResult<Stored> {
    let user = ctx.require_user()?;
    check_email(&ctx, input.email.as_deref())?;
    if !byok_permitted(&gateway, &input.provider) {
        return Err(GatewayError::Forbidden {
            reason: format!("BYOK is not permitted for provider {}", input.provider),
        });
    }
    gateway
        .vault
        .store(user, &input.provider, &input.api_key, &input.unlock_secret)
        .await
        .map_err(from_vault)?;
    Ok(Stored { stored: true })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderInput {
    #[serde(default)]
    email: Option<String>,
    provider: String,
}

async fn get_user_key(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: ProviderInput,
) -> GatewayResult<relay_vault::KeyStatus> {
    let user = ctx.require_user()?;
    check_email(&ctx, input.email.as_deref())?;
    gateway
        .vault
        .status(user, &input.provider)
        .await
        .map_err(from_vault)
}

async fn rotate_user_key(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: StoreKeyInput,
) -> GatewayResult<Stored> {
    let user = ctx.require_user()?;
    check_email(&ctx, input.email.as_deref())?;
    gateway
        .vault
        .rotate(user, &input.provider, &input.api_key, &input.unlock_secret)
        .await
        .map_err(from_vault)?;
    Ok(Stored { stored: true })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    deleted: bool,
}

async fn delete_user_key(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: ProviderInput,
) -> GatewayResult<Deleted> {
    let user = ctx.require_user()?;
    check_email(&ctx, input.email.as_deref())?;
    gateway
        .vault
        .delete(user, &input.provider)
        .await
        .map_err(from_vault)?;
    Ok(Deleted { deleted: true })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateKeyInput {
    #[serde(default)]
    email: Option<String>,
    provider: String,
    unlock_secret: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Validated {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn validate_user_key(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: ValidateKeyInput,
) -> GatewayResult<Validated> {
    let user = ctx.require_user()?;
    check_email(&ctx, input.email.as_deref())?;
    let key = gateway
        .vault
        .unlock(user, &input.provider, &input.unlock_secret)
        .await
        .map_err(from_vault)?;

    let adapter = gateway.adapter(&input.provider).ok_or_else(|| {
        GatewayError::InvalidArgument(format!("unknown provider: {}", input.provider))
    })?;
    let model = gateway
        .registry
        .resolve_model(&input.provider, None)
        .map_err(from_registry)?;

    Ok(match adapter.validate_key(&key, &model.id).await {
        Ok(()) => Validated {
            valid: true,
            error: None,
        },
        Err(e) => Validated {
            valid: false,
            error: Some(e.to_string()),
        },
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserProviders {
    providers: Vec<String>,
}

async fn get_user_providers(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<UserProviders> {
    let user = ctx.require_user()?;
    Ok(UserProviders {
        providers: gateway.vault.providers_for(user).await.map_err(from_vault)?,
    })
}
