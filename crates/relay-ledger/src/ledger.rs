//! The token ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_core::{BalancePool, UserId};
use relay_storage::{
    BalanceRow, BalanceStore, ReservationRow, ReservationStatus, ReservationStore, UsageEvent,
    UsageKind, UsageStore,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Ledger behaviour knobs (mapped from the `[ledger]` config section).
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Holds older than this are reclaimed by the sweeper.
    pub reservation_ttl: Duration,
    /// Sweeper scan interval.
    pub sweep_interval: Duration,
    /// Platform fee as a fraction of metered cost.
    pub platform_fee_rate: f64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(420),
            sweep_interval: Duration::from_secs(30),
            platform_fee_rate: 0.0,
        }
    }
}

/// Balance view returned by `billing.getTokenBalance`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    /// Purchased tokens (may be negative after an overage settlement).
    pub prepaid_tokens: i64,
    /// Remaining subscription tokens.
    pub subscription_tokens: i64,
    /// Tokens currently held by in-flight reservations.
    pub held_tokens: u64,
    /// Tokens a new reservation could claim right now.
    pub available_tokens: u64,
    /// When the subscription pool next resets.
    pub monthly_reset_at: Option<DateTime<Utc>>,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Balance held; settle or refund with the id.
    Held {
        /// The reservation id.
        reservation_id: Uuid,
        /// Tokens still available after the hold.
        remaining_balance: u64,
    },
    /// BYOK traffic: nothing held, nothing charged, usage logged only.
    Unmetered,
}

impl ReserveOutcome {
    /// The reservation id, when one was created.
    #[must_use]
    pub fn reservation_id(&self) -> Option<Uuid> {
        match self {
            Self::Held { reservation_id, .. } => Some(*reservation_id),
            Self::Unmetered => None,
        }
    }
}

/// Dry-run of a reservation (`billing.planConsumption`).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    /// Whether an actual reserve with these inputs would succeed.
    pub would_succeed: bool,
    /// Tokens the reservation would need.
    pub required: u64,
    /// Tokens currently available.
    pub available: u64,
}

/// Settlement input.
#[derive(Debug, Clone)]
pub struct SettleInput {
    /// The reservation being settled; doubles as the idempotency key.
    pub reservation_id: Uuid,
    /// Provider that served the request.
    pub provider: String,
    /// Model that served the request.
    pub model: String,
    /// Actual input tokens.
    pub input_tokens: u64,
    /// Actual output tokens.
    pub output_tokens: u64,
    /// Actual USD cost.
    pub cost_usd: f64,
    /// Platform fee. `None` = not applicable; `Some(0.0)` = real zero.
    pub platform_fee_usd: Option<f64>,
    /// Pool consumption order; `None` uses subscription-then-prepaid.
    pub consumption_order: Option<Vec<BalancePool>>,
}

/// Settlement result.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Tokens charged against the balance.
    pub tokens_charged: u64,
    /// Available tokens after settlement.
    pub remaining_balance: u64,
    /// The committed usage event.
    pub event_id: Option<Uuid>,
    /// Whether this call replayed an earlier settlement.
    pub replayed: bool,
}

/// The token ledger.
pub struct TokenLedger {
    balances: Arc<dyn BalanceStore>,
    reservations: Arc<dyn ReservationStore>,
    usage: Arc<dyn UsageStore>,
    settings: LedgerSettings,
    /// Per-user serialization. Entries are never removed; the map is
    /// bounded by the live user population.
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl TokenLedger {
    /// Build a ledger over the storage adapter's stores.
    #[must_use]
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        reservations: Arc<dyn ReservationStore>,
        usage: Arc<dyn UsageStore>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            balances,
            reservations,
            usage,
            settings,
            locks: DashMap::new(),
        }
    }

    /// Ledger behaviour knobs.
    #[must_use]
    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub(crate) fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        self.locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_balance(&self, user: &UserId) -> LedgerResult<BalanceRow> {
        Ok(self
            .balances
            .get(user)
            .await?
            .unwrap_or_else(|| BalanceRow::empty(user.clone())))
    }

    async fn held_tokens(&self, user: &UserId) -> LedgerResult<u64> {
        Ok(self
            .reservations
            .held_for(user)
            .await?
            .iter()
            .map(|r| r.estimated_tokens)
            .sum())
    }

    /// Current balance view.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn balance(&self, user: &UserId) -> LedgerResult<BalanceSummary> {
        let row = self.load_balance(user).await?;
        let held = self.held_tokens(user).await?;
        Ok(BalanceSummary {
            prepaid_tokens: row.prepaid_tokens,
            subscription_tokens: row.subscription_tokens,
            held_tokens: held,
            available_tokens: row.total().saturating_sub(held),
            monthly_reset_at: row.monthly_reset_at,
        })
    }

    /// Dry-run a reservation without allocating.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn plan(
        &self,
        user: &UserId,
        estimated_tokens: u64,
        has_own_key: bool,
    ) -> LedgerResult<PlanOutcome> {
        if has_own_key {
            return Ok(PlanOutcome {
                would_succeed: true,
                required: 0,
                available: 0,
            });
        }
        let summary = self.balance(user).await?;
        Ok(PlanOutcome {
            would_succeed: summary.available_tokens >= estimated_tokens,
            required: estimated_tokens,
            available: summary.available_tokens,
        })
    }

    /// Hold `estimated_tokens` against the user's balance.
    ///
    /// BYOK callers get [`ReserveOutcome::Unmetered`] without touching the
    /// balance. A zero-token reservation is accepted and settles against
    /// actuals.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] with the deficit, or a storage
    /// error.
    pub async fn reserve(
        &self,
        user: &UserId,
        estimated_tokens: u64,
        price_per_token: f64,
        has_own_key: bool,
    ) -> LedgerResult<ReserveOutcome> {
        if has_own_key {
            return Ok(ReserveOutcome::Unmetered);
        }

        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let row = self.load_balance(user).await?;
        let held = self.held_tokens(user).await?;
        let available = row.total().saturating_sub(held);
        if estimated_tokens > available {
            return Err(LedgerError::InsufficientBalance {
                required: estimated_tokens,
                available,
            });
        }

        let reservation = ReservationRow {
            id: Uuid::new_v4(),
            user: user.clone(),
            estimated_tokens,
            price_per_token,
            created_at: Utc::now(),
            status: ReservationStatus::Held,
        };
        let id = reservation.id;
        self.reservations.insert(reservation).await?;

        Ok(ReserveOutcome::Held {
            reservation_id: id,
            remaining_balance: available.saturating_sub(estimated_tokens),
        })
    }

    /// Settle a reservation at actual token counts.
    ///
    /// Idempotent on the reservation id: a replay returns the first
    /// outcome without a second charge or a second event.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownReservation`], [`LedgerError::ReservationExpired`]
    /// (caller then records a `lost` event), [`LedgerError::ReservationNotHeld`],
    /// or a storage error.
    pub async fn settle(&self, input: SettleInput) -> LedgerResult<Settlement> {
        let reservation = self
            .reservations
            .get(input.reservation_id)
            .await?
            .ok_or(LedgerError::UnknownReservation(input.reservation_id))?;

        let lock = self.user_lock(&reservation.user);
        let _guard = lock.lock().await;

        // Re-read under the lock; the sweeper may have run in between.
        let reservation = self
            .reservations
            .get(input.reservation_id)
            .await?
            .ok_or(LedgerError::UnknownReservation(input.reservation_id))?;

        match reservation.status {
            ReservationStatus::Held => {},
            ReservationStatus::Committed => {
                let event = self.usage.by_reservation(input.reservation_id).await?;
                let summary = self.balance(&reservation.user).await?;
                return Ok(Settlement {
                    tokens_charged: event
                        .as_ref()
                        .map_or(0, |e| e.input_tokens.saturating_add(e.output_tokens)),
                    remaining_balance: summary.available_tokens,
                    event_id: event.map(|e| e.id),
                    replayed: true,
                });
            },
            ReservationStatus::Expired => {
                return Err(LedgerError::ReservationExpired(input.reservation_id));
            },
            ReservationStatus::Refunded => {
                return Err(LedgerError::ReservationNotHeld {
                    id: input.reservation_id,
                    status: reservation.status,
                });
            },
        }

        let actual_tokens = input.input_tokens.saturating_add(input.output_tokens);
        let mut row = self.load_balance(&reservation.user).await?;
        deduct(&mut row, actual_tokens, input.consumption_order.as_deref());
        self.balances.put(row).await?;

        let committed = self
            .reservations
            .transition(
                input.reservation_id,
                ReservationStatus::Held,
                ReservationStatus::Committed,
            )
            .await?;
        if !committed {
            // Lost the race despite the lock; treat as a replay.
            warn!(reservation = %input.reservation_id, "Settlement CAS failed after lock");
            return Err(LedgerError::ReservationNotHeld {
                id: input.reservation_id,
                status: ReservationStatus::Committed,
            });
        }

        let event = UsageEvent {
            id: Uuid::new_v4(),
            user: reservation.user.clone(),
            provider: input.provider,
            model: input.model,
            input_tokens: input.input_tokens,
            output_tokens: input.output_tokens,
            cost_usd: input.cost_usd,
            platform_fee_usd: input.platform_fee_usd,
            reservation_id: Some(input.reservation_id),
            kind: UsageKind::Metered,
            occurred_at: Utc::now(),
        };
        let event_id = event.id;
        self.usage.append(event).await?;

        let summary = self.balance(&reservation.user).await?;
        info!(
            user = %reservation.user,
            reservation = %input.reservation_id,
            tokens = actual_tokens,
            "Settled reservation"
        );
        Ok(Settlement {
            tokens_charged: actual_tokens,
            remaining_balance: summary.available_tokens,
            event_id: Some(event_id),
            replayed: false,
        })
    }

    /// Release a held reservation without charging.
    ///
    /// Holds are never deducted from the stored balance, so the flip to
    /// `refunded` restores availability exactly. Returns whether a hold
    /// was actually released (a second refund is a no-op).
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownReservation`] or a storage error.
    pub async fn refund(&self, reservation_id: Uuid) -> LedgerResult<bool> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await?
            .ok_or(LedgerError::UnknownReservation(reservation_id))?;

        let lock = self.user_lock(&reservation.user);
        let _guard = lock.lock().await;

        Ok(self
            .reservations
            .transition(
                reservation_id,
                ReservationStatus::Held,
                ReservationStatus::Refunded,
            )
            .await?)
    }

    /// Record BYOK traffic for analytics. Never touches the balance.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn record_unmetered(
        &self,
        user: &UserId,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> LedgerResult<()> {
        self.usage
            .append(UsageEvent {
                id: Uuid::new_v4(),
                user: user.clone(),
                provider: provider.to_string(),
                model: model.to_string(),
                input_tokens,
                output_tokens,
                cost_usd: 0.0,
                platform_fee_usd: None,
                reservation_id: None,
                kind: UsageKind::Unmetered,
                occurred_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Record spend that could not be settled or refunded. Operator
    /// reconciliation reads these back out by kind.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn record_lost(
        &self,
        user: &UserId,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        reservation_id: Option<Uuid>,
    ) -> LedgerResult<()> {
        warn!(
            user = %user,
            reservation = ?reservation_id,
            "Recording lost usage for operator reconciliation"
        );
        self.usage
            .append(UsageEvent {
                id: Uuid::new_v4(),
                user: user.clone(),
                provider: provider.to_string(),
                model: model.to_string(),
                input_tokens,
                output_tokens,
                cost_usd,
                platform_fee_usd: None,
                reservation_id,
                kind: UsageKind::Lost,
                occurred_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Add tokens to a pool (operator tooling / purchase fulfilment).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn grant(
        &self,
        user: &UserId,
        tokens: i64,
        pool: BalancePool,
    ) -> LedgerResult<BalanceSummary> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let mut row = self.load_balance(user).await?;
        match pool {
            BalancePool::Prepaid => {
                row.prepaid_tokens = row.prepaid_tokens.saturating_add(tokens);
            },
            BalancePool::Subscription => {
                row.subscription_tokens = row.subscription_tokens.saturating_add(tokens);
            },
        }
        self.balances.put(row).await?;
        drop(_guard);
        self.balance(user).await
    }

    /// Most-recent-first usage page.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn history(
        &self,
        user: &UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<UsageEvent>> {
        Ok(self.usage.list(user, limit, before).await?)
    }

    /// Reclaim holds older than the TTL. Returns how many were expired.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the scan; per-row failures are logged
    /// and skipped.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> LedgerResult<usize> {
        let ttl = chrono::Duration::from_std(self.settings.reservation_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(420));
        let cutoff = now - ttl;
        let stale = self.reservations.held_older_than(cutoff).await?;

        let mut expired = 0_usize;
        for reservation in stale {
            let lock = self.user_lock(&reservation.user);
            let _guard = lock.lock().await;
            match self
                .reservations
                .transition(
                    reservation.id,
                    ReservationStatus::Held,
                    ReservationStatus::Expired,
                )
                .await
            {
                Ok(true) => {
                    expired = expired.saturating_add(1);
                    info!(
                        reservation = %reservation.id,
                        user = %reservation.user,
                        held_tokens = reservation.estimated_tokens,
                        "Expired stale reservation"
                    );
                },
                Ok(false) => {},
                Err(e) => warn!(reservation = %reservation.id, error = %e, "Expiry failed"),
            }
        }
        Ok(expired)
    }
}

impl std::fmt::Debug for TokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLedger")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Deduct tokens from balance pools in consumption order. Whatever the
/// last pool cannot cover goes negative there (overage policy).
fn deduct(row: &mut BalanceRow, tokens: u64, order: Option<&[BalancePool]>) {
    const DEFAULT_ORDER: [BalancePool; 2] = [BalancePool::Subscription, BalancePool::Prepaid];
    let order = order.filter(|o| !o.is_empty()).unwrap_or(&DEFAULT_ORDER);

    let mut remaining = i64::try_from(tokens).unwrap_or(i64::MAX);
    for (index, pool) in order.iter().enumerate() {
        let last = index == order.len().saturating_sub(1);
        let balance = match pool {
            BalancePool::Subscription => &mut row.subscription_tokens,
            BalancePool::Prepaid => &mut row.prepaid_tokens,
        };
        let take = if last {
            remaining
        } else {
            remaining.min((*balance).max(0))
        };
        *balance = balance.saturating_sub(take);
        remaining = remaining.saturating_sub(take);
        if remaining == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::StorageAdapter;

    fn ledger() -> (TokenLedger, StorageAdapter) {
        let storage = StorageAdapter::in_memory();
        let ledger = TokenLedger::new(
            storage.balances.clone(),
            storage.reservations.clone(),
            storage.usage.clone(),
            LedgerSettings::default(),
        );
        (ledger, storage)
    }

    async fn grant_prepaid(ledger: &TokenLedger, user: &UserId, tokens: i64) {
        ledger.grant(user, tokens, BalancePool::Prepaid).await.unwrap();
    }

    fn settle_input(id: Uuid, input: u64, output: u64) -> SettleInput {
        SettleInput {
            reservation_id: id,
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            input_tokens: input,
            output_tokens: output,
            cost_usd: 0.01,
            platform_fee_usd: Some(0.0),
            consumption_order: None,
        }
    }

    #[tokio::test]
    async fn test_reserve_settle_balance_math() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let outcome = ledger.reserve(&user, 300, 0.000_003, false).await.unwrap();
        let ReserveOutcome::Held {
            reservation_id,
            remaining_balance,
        } = outcome
        else {
            panic!("expected a hold");
        };
        assert_eq!(remaining_balance, 700);

        // Held, not deducted: stored balance unchanged, availability down.
        let summary = ledger.balance(&user).await.unwrap();
        assert_eq!(summary.prepaid_tokens, 1000);
        assert_eq!(summary.held_tokens, 300);
        assert_eq!(summary.available_tokens, 700);

        let settlement = ledger
            .settle(settle_input(reservation_id, 100, 150))
            .await
            .unwrap();
        assert_eq!(settlement.tokens_charged, 250);
        assert!(!settlement.replayed);

        let summary = ledger.balance(&user).await.unwrap();
        assert_eq!(summary.available_tokens, 750);
        assert_eq!(summary.held_tokens, 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_carries_deficit() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 100).await;

        let err = ledger.reserve(&user, 500, 0.0, false).await.unwrap_err();
        match err {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => {
                assert_eq!(required, 500);
                assert_eq!(available, 100);
            },
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_plan_matches_reserve() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 100).await;

        let plan = ledger.plan(&user, 500, false).await.unwrap();
        assert!(!plan.would_succeed);
        assert_eq!(plan.required, 500);
        assert_eq!(plan.available, 100);

        // Dry-run holds nothing.
        assert_eq!(ledger.balance(&user).await.unwrap().held_tokens, 0);

        let byok = ledger.plan(&user, 500, true).await.unwrap();
        assert!(byok.would_succeed);
    }

    #[tokio::test]
    async fn test_byok_reserve_is_unmetered_stub() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        let outcome = ledger.reserve(&user, 10_000, 0.0, true).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Unmetered));
        assert_eq!(ledger.balance(&user).await.unwrap().held_tokens, 0);
    }

    #[tokio::test]
    async fn test_zero_token_reservation_accepted() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        let outcome = ledger.reserve(&user, 0, 0.0, false).await.unwrap();
        let id = outcome.reservation_id().unwrap();

        let settlement = ledger.settle(settle_input(id, 3, 4)).await.unwrap();
        assert_eq!(settlement.tokens_charged, 7);
    }

    #[tokio::test]
    async fn test_overage_deducts_actuals_and_can_go_negative() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let id = ledger
            .reserve(&user, 1000, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        let settlement = ledger.settle(settle_input(id, 700, 500)).await.unwrap();
        assert_eq!(settlement.tokens_charged, 1200);

        let summary = ledger.balance(&user).await.unwrap();
        assert_eq!(summary.prepaid_tokens, -200);
        assert_eq!(summary.available_tokens, 0);

        // The next reservation sees the true balance.
        assert!(ledger.reserve(&user, 1, 0.0, false).await.is_err());
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let (ledger, storage) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let id = ledger
            .reserve(&user, 500, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        let first = ledger.settle(settle_input(id, 100, 100)).await.unwrap();
        let second = ledger.settle(settle_input(id, 100, 100)).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.tokens_charged, second.tokens_charged);
        assert_eq!(first.event_id, second.event_id);

        // One event, one charge.
        let events = storage.usage.list(&user, 10, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(ledger.balance(&user).await.unwrap().available_tokens, 800);
    }

    #[tokio::test]
    async fn test_refund_restores_pre_reserve_balance() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let id = ledger
            .reserve(&user, 400, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        assert_eq!(ledger.balance(&user).await.unwrap().available_tokens, 600);

        assert!(ledger.refund(id).await.unwrap());
        assert_eq!(ledger.balance(&user).await.unwrap().available_tokens, 1000);

        // Second refund is a no-op.
        assert!(!ledger.refund(id).await.unwrap());
        // A refunded reservation cannot settle.
        assert!(matches!(
            ledger.settle(settle_input(id, 1, 1)).await.unwrap_err(),
            LedgerError::ReservationNotHeld { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_reservation_rejects_settlement() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let id = ledger
            .reserve(&user, 400, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();

        // Sweep with a future clock so the hold is past its TTL.
        let future = Utc::now() + chrono::Duration::seconds(3600);
        let expired = ledger.sweep_expired(future).await.unwrap();
        assert_eq!(expired, 1);

        // Balance restored.
        assert_eq!(ledger.balance(&user).await.unwrap().available_tokens, 1000);

        // Late settlement is rejected.
        assert!(matches!(
            ledger.settle(settle_input(id, 1, 1)).await.unwrap_err(),
            LedgerError::ReservationExpired(_)
        ));
    }

    #[tokio::test]
    async fn test_sweep_ignores_fresh_holds() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;
        ledger.reserve(&user, 400, 0.0, false).await.unwrap();

        assert_eq!(ledger.sweep_expired(Utc::now()).await.unwrap(), 0);
        assert_eq!(ledger.balance(&user).await.unwrap().held_tokens, 400);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_observe_consistent_balance() {
        let (ledger, _) = ledger();
        let ledger = Arc::new(ledger);
        let user = UserId::new("u1");
        grant_prepaid(&ledger, &user, 1000).await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                ledger.reserve(&user, 300, 0.0, false).await.is_ok()
            }));
        }

        let granted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        // 1000 tokens cover exactly three 300-token holds.
        assert_eq!(granted, 3);
        assert_eq!(ledger.balance(&user).await.unwrap().held_tokens, 900);
    }

    #[tokio::test]
    async fn test_consumption_order_preference() {
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        ledger.grant(&user, 500, BalancePool::Prepaid).await.unwrap();
        ledger
            .grant(&user, 500, BalancePool::Subscription)
            .await
            .unwrap();

        let id = ledger
            .reserve(&user, 200, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        let mut input = settle_input(id, 100, 100);
        input.consumption_order = Some(vec![BalancePool::Prepaid, BalancePool::Subscription]);
        ledger.settle(input).await.unwrap();

        let summary = ledger.balance(&user).await.unwrap();
        assert_eq!(summary.prepaid_tokens, 300);
        assert_eq!(summary.subscription_tokens, 500);
    }

    #[tokio::test]
    async fn test_ledger_safety_invariant() {
        // balance == grants − Σ committed − Σ held after every operation.
        let (ledger, _) = ledger();
        let user = UserId::new("u1");
        let grants: i64 = 2000;
        grant_prepaid(&ledger, &user, grants).await;

        let mut committed: i64 = 0;
        let mut held: i64 = 0;

        let check = |summary: BalanceSummary, committed: i64, held: i64| {
            assert_eq!(
                i64::try_from(summary.available_tokens).unwrap(),
                grants - committed - held
            );
        };

        let a = ledger
            .reserve(&user, 400, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        held += 400;
        check(ledger.balance(&user).await.unwrap(), committed, held);

        let b = ledger
            .reserve(&user, 300, 0.0, false)
            .await
            .unwrap()
            .reservation_id()
            .unwrap();
        held += 300;
        check(ledger.balance(&user).await.unwrap(), committed, held);

        ledger.settle(settle_input(a, 150, 100)).await.unwrap();
        held -= 400;
        committed += 250;
        check(ledger.balance(&user).await.unwrap(), committed, held);

        ledger.refund(b).await.unwrap();
        held -= 300;
        check(ledger.balance(&user).await.unwrap(), committed, held);
    }
}
