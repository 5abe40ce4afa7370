//! Usage analytics over the event stream.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use relay_core::UserId;
use relay_storage::{UsageEvent, UsageKind};
use serde::Serialize;

use crate::error::LedgerResult;
use crate::ledger::TokenLedger;

/// Per-provider aggregate.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    /// Requests served.
    pub requests: u64,
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Metered USD cost.
    pub cost_usd: f64,
}

/// Aggregated usage for `billing.getUsageAnalytics`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalytics {
    /// Window length, days.
    pub days: u32,
    /// Requests in the window (metered + unmetered).
    pub total_requests: u64,
    /// Input tokens in the window.
    pub total_input_tokens: u64,
    /// Output tokens in the window.
    pub total_output_tokens: u64,
    /// Metered USD cost in the window.
    pub total_cost_usd: f64,
    /// Of which BYOK (unmetered) requests.
    pub byok_requests: u64,
    /// Per-provider breakdown.
    pub by_provider: BTreeMap<String, ProviderUsage>,
    /// Raw events, when the caller asked for them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<UsageEvent>>,
}

impl TokenLedger {
    /// Aggregate a user's usage over the trailing `days`.
    ///
    /// `Lost` events are excluded from totals - they represent spend under
    /// reconciliation, not served traffic - but appear in `history`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn analytics(
        &self,
        user: &UserId,
        days: u32,
        include_history: bool,
    ) -> LedgerResult<UsageAnalytics> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let events = self.usage_since(user, cutoff).await?;

        let mut analytics = UsageAnalytics {
            days,
            total_requests: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: 0.0,
            byok_requests: 0,
            by_provider: BTreeMap::new(),
            history: None,
        };

        for event in &events {
            if event.kind == UsageKind::Lost {
                continue;
            }
            analytics.total_requests = analytics.total_requests.saturating_add(1);
            analytics.total_input_tokens =
                analytics.total_input_tokens.saturating_add(event.input_tokens);
            analytics.total_output_tokens = analytics
                .total_output_tokens
                .saturating_add(event.output_tokens);
            analytics.total_cost_usd += event.cost_usd;
            if event.kind == UsageKind::Unmetered {
                analytics.byok_requests = analytics.byok_requests.saturating_add(1);
            }

            let provider = analytics.by_provider.entry(event.provider.clone()).or_default();
            provider.requests = provider.requests.saturating_add(1);
            provider.input_tokens = provider.input_tokens.saturating_add(event.input_tokens);
            provider.output_tokens = provider.output_tokens.saturating_add(event.output_tokens);
            provider.cost_usd += event.cost_usd;
        }

        if include_history {
            analytics.history = Some(events);
        }
        Ok(analytics)
    }

    async fn usage_since(
        &self,
        user: &UserId,
        cutoff: chrono::DateTime<Utc>,
    ) -> LedgerResult<Vec<UsageEvent>> {
        Ok(self.usage_store().since(user, cutoff).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerSettings;
    use relay_core::BalancePool;
    use relay_storage::StorageAdapter;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_analytics_aggregates_and_separates_byok() {
        let storage = StorageAdapter::in_memory();
        let ledger = Arc::new(TokenLedger::new(
            storage.balances.clone(),
            storage.reservations.clone(),
            storage.usage.clone(),
            LedgerSettings::default(),
        ));
        let user = UserId::new("u1");
        ledger.grant(&user, 1000, BalancePool::Prepaid).await.unwrap();

        // One metered request.
        let id = ledger
            .reserve(&user, 100, 0.000_015, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        ledger
            .settle(crate::ledger::SettleInput {
                reservation_id: id,
                provider: "anthropic".into(),
                model: "claude-sonnet-4-20250514".into(),
                input_tokens: 50,
                output_tokens: 30,
                cost_usd: 0.002,
                platform_fee_usd: Some(0.0),
                consumption_order: None,
            })
            .await
            .unwrap();

        // One BYOK request.
        ledger
            .record_unmetered(&user, "openai", "gpt-4o", 10, 20)
            .await
            .unwrap();

        // One lost record; must not count toward totals.
        ledger
            .record_lost(&user, "anthropic", "m", 5, 5, 0.001, None)
            .await
            .unwrap();

        let analytics = ledger.analytics(&user, 7, true).await.unwrap();
        assert_eq!(analytics.total_requests, 2);
        assert_eq!(analytics.byok_requests, 1);
        assert_eq!(analytics.total_input_tokens, 60);
        assert_eq!(analytics.total_output_tokens, 50);
        assert_eq!(analytics.by_provider.len(), 2);
        assert_eq!(analytics.by_provider["anthropic"].requests, 1);

        // History includes all three events.
        assert_eq!(analytics.history.unwrap().len(), 3);
    }
}
