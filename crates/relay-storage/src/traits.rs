//! The five storage traits and the adapter bundle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{UserId, UserProfile};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::memory::MemoryStore;
use crate::types::{BalanceRow, ByokRecord, ReservationRow, ReservationStatus, UsageEvent};

/// Keyed BYOK ciphertext table.
#[async_trait]
pub trait ByokStore: Send + Sync {
    /// Insert or replace the entry for `(record.user, record.provider)`.
    async fn upsert(&self, record: ByokRecord) -> StorageResult<()>;

    /// Fetch one entry.
    async fn get(&self, user: &UserId, provider: &str) -> StorageResult<Option<ByokRecord>>;

    /// Delete one entry. Returns whether anything was removed; deleting a
    /// missing entry is not an error.
    async fn remove(&self, user: &UserId, provider: &str) -> StorageResult<bool>;

    /// Providers the user has stored keys for.
    async fn providers_for(&self, user: &UserId) -> StorageResult<Vec<String>>;
}

/// One balance row per user.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Fetch the row, if the user has one.
    async fn get(&self, user: &UserId) -> StorageResult<Option<BalanceRow>>;

    /// Write the row. Callers serialize per-user access; the store itself
    /// only guarantees whole-row atomicity.
    async fn put(&self, row: BalanceRow) -> StorageResult<()>;
}

/// Append-only usage-event stream.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append an event.
    async fn append(&self, event: UsageEvent) -> StorageResult<()>;

    /// Most-recent-first page of a user's events. `before` is the cursor:
    /// only events strictly older than it are returned.
    async fn list(
        &self,
        user: &UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<UsageEvent>>;

    /// Find the event that settled a reservation.
    async fn by_reservation(&self, reservation: Uuid) -> StorageResult<Option<UsageEvent>>;

    /// All of a user's events at or after `cutoff`, oldest first.
    async fn since(&self, user: &UserId, cutoff: DateTime<Utc>) -> StorageResult<Vec<UsageEvent>>;
}

/// Reservation table.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert a new reservation.
    async fn insert(&self, row: ReservationRow) -> StorageResult<()>;

    /// Fetch by id.
    async fn get(&self, id: Uuid) -> StorageResult<Option<ReservationRow>>;

    /// Compare-and-swap the status. Returns `false` (without writing) when
    /// the current status differs from `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> StorageResult<bool>;

    /// All held reservations for a user.
    async fn held_for(&self, user: &UserId) -> StorageResult<Vec<ReservationRow>>;

    /// Held reservations created before `cutoff` (sweeper input).
    async fn held_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<ReservationRow>>;
}

/// User profiles and preferences.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a profile.
    async fn get(&self, user: &UserId) -> StorageResult<Option<UserProfile>>;

    /// Insert or replace a profile.
    async fn put(&self, profile: UserProfile) -> StorageResult<()>;

    /// Number of known users.
    async fn count(&self) -> StorageResult<usize>;
}

/// Bundle of the five stores, as held by the gateway.
#[derive(Clone)]
pub struct StorageAdapter {
    /// BYOK ciphertext table.
    pub byok: Arc<dyn ByokStore>,
    /// Balance rows.
    pub balances: Arc<dyn BalanceStore>,
    /// Usage-event stream.
    pub usage: Arc<dyn UsageStore>,
    /// Reservation table.
    pub reservations: Arc<dyn ReservationStore>,
    /// User profiles.
    pub users: Arc<dyn UserStore>,
}

impl StorageAdapter {
    /// All five stores backed by one in-memory instance.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            byok: store.clone(),
            balances: store.clone(),
            usage: store.clone(),
            reservations: store.clone(),
            users: store,
        }
    }
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter").finish_non_exhaustive()
    }
}
