//! Row types persisted through the storage adapter.

use chrono::{DateTime, Utc};
use relay_core::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key-derivation parameters stored alongside BYOK ciphertext.
///
/// Captured at encryption time so records survive parameter changes; the
/// vault always derives with the record's own parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Per-record random salt.
    pub salt: Vec<u8>,
    /// Argon2 memory cost (KiB).
    pub memory_kib: u32,
    /// Argon2 iteration count.
    pub iterations: u32,
    /// Argon2 lane count.
    pub parallelism: u32,
}

/// One encrypted BYOK entry. Unique per `(user, provider)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByokRecord {
    /// Owning user.
    pub user: UserId,
    /// Provider the key belongs to.
    pub provider: String,
    /// AEAD ciphertext of the API key.
    pub ciphertext: Vec<u8>,
    /// AEAD nonce.
    pub nonce: Vec<u8>,
    /// KDF parameters used for this record.
    pub kdf: KdfParams,
    /// When the entry was first stored.
    pub created_at: DateTime<Utc>,
    /// When the key was last rotated.
    pub rotated_at: Option<DateTime<Utc>>,
}

/// Per-user balance row. Token-denominated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    /// Owning user.
    pub user: UserId,
    /// Purchased tokens. May dip below zero transiently after an overage
    /// settlement; the next reservation sees the true value.
    pub prepaid_tokens: i64,
    /// Remaining monthly subscription tokens.
    pub subscription_tokens: i64,
    /// When the subscription pool next resets.
    pub monthly_reset_at: Option<DateTime<Utc>>,
}

impl BalanceRow {
    /// Empty balance for a new user.
    #[must_use]
    pub fn empty(user: UserId) -> Self {
        Self {
            user,
            prepaid_tokens: 0,
            subscription_tokens: 0,
            monthly_reset_at: None,
        }
    }

    /// Total spendable tokens, clamped at zero.
    #[must_use]
    pub fn total(&self) -> u64 {
        let sum = self.prepaid_tokens.saturating_add(self.subscription_tokens);
        u64::try_from(sum).unwrap_or(0)
    }
}

/// Reservation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Balance is held pending settlement.
    Held,
    /// Settled into a usage event.
    Committed,
    /// Released without spend.
    Refunded,
    /// Reclaimed by the sweeper after the TTL.
    Expired,
}

/// A held claim on a user's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRow {
    /// Reservation id; doubles as the settlement idempotency key.
    pub id: Uuid,
    /// Owning user.
    pub user: UserId,
    /// Upper-bound token estimate held against the balance.
    pub estimated_tokens: u64,
    /// USD price per token captured at reservation time.
    pub price_per_token: f64,
    /// Creation timestamp; the sweeper compares this against the TTL.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: ReservationStatus,
}

/// Discriminates why a usage event exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    /// Charged against the user's balance.
    Metered,
    /// BYOK traffic, recorded for analytics only.
    Unmetered,
    /// Compensating record: spend happened but could not be settled
    /// (expired reservation or failed refund). Operator reconciliation
    /// target.
    Lost,
}

/// Immutable usage record. Never mutated once appended; corrections are
/// separate compensating events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Event id.
    pub id: Uuid,
    /// Owning user.
    pub user: UserId,
    /// Provider that served the request.
    pub provider: String,
    /// Model that served the request.
    pub model: String,
    /// Input tokens actually consumed.
    pub input_tokens: u64,
    /// Output tokens actually produced.
    pub output_tokens: u64,
    /// USD cost at the captured price.
    pub cost_usd: f64,
    /// Platform fee. `None` means not applicable (unmetered traffic);
    /// `Some(0.0)` is a real zero fee.
    pub platform_fee_usd: Option<f64>,
    /// Reservation this event settled, if any.
    pub reservation_id: Option<Uuid>,
    /// Why the event exists.
    pub kind: UsageKind,
    /// When the spend occurred.
    pub occurred_at: DateTime<Utc>,
}
