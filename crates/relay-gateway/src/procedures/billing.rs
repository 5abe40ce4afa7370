//! The `billing` namespace.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::{BalancePool, GatewayResult, RequestContext, UserId};
use relay_ledger::{BalanceSummary, PlanOutcome, UsageAnalytics};
use relay_storage::UsageEvent;
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::from_ledger;
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "billing.getTokenBalance",
        description: "The caller's token balance",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_token_balance),
    });
    registry.add(Procedure {
        name: "billing.getUsageHistory",
        description: "Paged usage history, most recent first",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_usage_history),
    });
    registry.add(Procedure {
        name: "billing.getUsageAnalytics",
        description: "Aggregated usage over a trailing window",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_usage_analytics),
    });
    registry.add(Procedure {
        name: "billing.planConsumption",
        description: "Dry-run a reservation without allocating",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(plan_consumption),
    });
    registry.add(Procedure {
        name: "billing.grantTokens",
        description: "Credit tokens to a user's balance pool",
        auth_required: true,
        admin_only: true,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(grant_tokens),
    });
}

async fn get_token_balance(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<BalanceSummary> {
    let user = ctx.require_user()?;
    gateway.ledger.balance(user).await.map_err(from_ledger)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HistoryInput {
    limit: usize,
    /// Events strictly older than this timestamp.
    cursor: Option<DateTime<Utc>>,
}

impl Default for HistoryInput {
    fn default() -> Self {
        Self {
            limit: 50,
            cursor: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    events: Vec<UsageEvent>,
    /// Pass back as `cursor` to fetch the next page.
    next_cursor: Option<DateTime<Utc>>,
}

async fn get_usage_history(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: HistoryInput,
) -> GatewayResult<HistoryPage> {
    let user = ctx.require_user()?;
    let limit = input.limit.clamp(1, 500);
    let events = gateway
        .ledger
        .history(user, limit, input.cursor)
        .await
        .map_err(from_ledger)?;
    let next_cursor = (events.len() == limit)
        .then(|| events.last().map(|e| e.occurred_at))
        .flatten();
    Ok(HistoryPage {
        events,
        next_cursor,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnalyticsInput {
    days: u32,
    include_history: bool,
}

impl Default for AnalyticsInput {
    fn default() -> Self {
        Self {
            days: 30,
            include_history: false,
        }
    }
}

async fn get_usage_analytics(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: AnalyticsInput,
) -> GatewayResult<UsageAnalytics> {
    let user = ctx.require_user()?;
    gateway
        .ledger
        .analytics(user, input.days.clamp(1, 365), input.include_history)
        .await
        .map_err(from_ledger)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanInput {
    estimated_tokens: u64,
    #[serde(default)]
    has_api_key: bool,
}

async fn plan_consumption(
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    input: PlanInput,
) -> GatewayResult<PlanOutcome> {
    let user = ctx.require_user()?;
    gateway
        .ledger
        .plan(user, input.estimated_tokens, input.has_api_key)
        .await
        .map_err(from_ledger)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantInput {
    user: UserId,
    tokens: i64,
    pool: BalancePool,
}

async fn grant_tokens(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: GrantInput,
) -> GatewayResult<BalanceSummary> {
    gateway.ensure_user(&input.user).await?;
    gateway
        .ledger
        .grant(&input.user, input.tokens, input.pool)
        .await
        .map_err(from_ledger)
}
