//! The `user` namespace: profile and preferences.

use std::sync::Arc;

use relay_core::{GatewayResult, RequestContext, UserPreferences, UserProfile};
use serde::Deserialize;

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::from_storage;
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "user.getProfile",
        description: "The caller's profile",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_profile),
    });
    registry.add(Procedure {
        name: "user.updatePreferences",
        description: "Replace the caller's preferences",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(update_preferences),
    });
}

async fn get_profile(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<UserProfile> {
    let user = ctx.require_user()?;
    gateway.ensure_user(user).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePreferencesInput {
    preferences: UserPreferences,
}

async fn update_preferences(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: UpdatePreferencesInput,
) -> GatewayResult<UserProfile> {
    let user = ctx.require_user()?;
    let mut profile = gateway.ensure_user(user).await?;
    profile.preferences = input.preferences;
    gateway
        .storage
        .users
        .put(profile.clone())
        .await
        .map_err(from_storage)?;
    Ok(profile)
}
