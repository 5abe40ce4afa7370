//! The `admin` namespace: operator tooling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::{GatewayResult, RequestContext, UserId, UserProfile};
use relay_ledger::BalanceSummary;
use relay_registry::{PricingOverride, RegistryHealth};
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::{from_ledger, from_storage};
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "admin.status",
        description: "Gateway status summary",
        auth_required: true,
        admin_only: true,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(status),
    });
    registry.add(Procedure {
        name: "admin.statistics",
        description: "Operational statistics",
        auth_required: true,
        admin_only: true,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(statistics),
    });
    registry.add(Procedure {
        name: "admin.healthCheck",
        description: "Liveness probe",
        auth_required: false,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(health_check),
    });
    registry.add(Procedure {
        name: "admin.getConfig",
        description: "Effective configuration, secrets redacted",
        auth_required: true,
        admin_only: true,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_config),
    });
    registry.add(Procedure {
        name: "admin.clearCache",
        description: "Drop pricing overrides and refresh the catalog",
        auth_required: true,
        admin_only: true,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(clear_cache),
    });
    registry.add(Procedure {
        name: "admin.getUserInfo",
        description: "A user's profile and balance",
        auth_required: true,
        admin_only: true,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_user_info),
    });
    registry.add(Procedure {
        name: "admin.addPricingOverride",
        description: "Override a model's pricing above catalog data",
        auth_required: true,
        admin_only: true,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(add_pricing_override),
    });
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    version: &'static str,
    started_at: DateTime<Utc>,
    uptime_secs: i64,
    registry: RegistryHealth,
    providers: usize,
}

async fn status(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Status> {
    Ok(Status {
        version: env!("CARGO_PKG_VERSION"),
        started_at: gateway.started_at,
        uptime_secs: (Utc::now() - gateway.started_at).num_seconds(),
        registry: gateway.registry.health(),
        providers: gateway.registry.list_providers().len(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    users: usize,
    workspaces: usize,
    client_workspaces: usize,
    models: usize,
}

async fn statistics(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Statistics> {
    Ok(Statistics {
        users: gateway.storage.users.count().await.map_err(from_storage)?,
        workspaces: gateway.workspaces.list().len(),
        client_workspaces: gateway.client_workspaces.list().len(),
        models: gateway.registry.snapshot().model_count(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    ok: bool,
    registry: RegistryHealth,
}

async fn health_check(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Health> {
    Ok(Health {
        ok: true,
        registry: gateway.registry.health(),
    })
}

/// Redacted configuration view. Provider keys, auth tokens, and anything
/// secret-bearing are structurally absent, not blanked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedactedConfig {
    listen: String,
    request_deadline_secs: u64,
    default_max_tokens: u32,
    max_max_tokens: u32,
    system_prompt_max_length: usize,
    reservation_ttl_secs: u64,
    platform_fee_rate: f64,
    providers: Vec<String>,
    byok_providers: Vec<String>,
    workspaces: Vec<String>,
}

async fn get_config(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<RedactedConfig> {
    let config = &gateway.config;
    Ok(RedactedConfig {
        listen: config.server.listen.clone(),
        request_deadline_secs: config.server.request_deadline_secs,
        default_max_tokens: config.limits.default_max_tokens,
        max_max_tokens: config.limits.max_max_tokens,
        system_prompt_max_length: config.limits.system_prompt_max_length,
        reservation_ttl_secs: config.ledger.reservation_ttl_secs,
        platform_fee_rate: config.ledger.platform_fee_rate,
        providers: gateway.policy.allowed.iter().cloned().collect(),
        byok_providers: gateway.policy.byok_providers.iter().cloned().collect(),
        workspaces: gateway.workspaces.list().into_iter().map(|w| w.id).collect(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheCleared {
    cleared: bool,
    refreshed: bool,
}

async fn clear_cache(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<CacheCleared> {
    gateway.registry.clear_overrides();
    let refreshed = gateway.registry.refresh().await.is_ok();
    Ok(CacheCleared {
        cleared: true,
        refreshed,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfoInput {
    user: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    profile: Option<UserProfile>,
    balance: BalanceSummary,
    byok_providers: Vec<String>,
}

async fn get_user_info(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: UserInfoInput,
) -> GatewayResult<UserInfo> {
    let profile = gateway
        .storage
        .users
        .get(&input.user)
        .await
        .map_err(from_storage)?;
    let balance = gateway.ledger.balance(&input.user).await.map_err(from_ledger)?;
    let byok_providers = gateway
        .vault
        .providers_for(&input.user)
        .await
        .map_err(crate::error::from_vault)?;
    Ok(UserInfo {
        profile,
        balance,
        byok_providers,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OverrideAdded {
    added: bool,
}

async fn add_pricing_override(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: PricingOverride,
) -> GatewayResult<OverrideAdded> {
    gateway.registry.add_pricing_override(input);
    Ok(OverrideAdded { added: true })
}
