//! In-memory implementation of all five stores.
//!
//! Suitable for development and tests; everything is lost on restart.
//! Durable deployments substitute their own adapter crates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{UserId, UserProfile};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::traits::{BalanceStore, ByokStore, ReservationStore, UsageStore, UserStore};
use crate::types::{BalanceRow, ByokRecord, ReservationRow, ReservationStatus, UsageEvent};

/// One process-local store backing all five traits.
#[derive(Default)]
pub struct MemoryStore {
    byok: RwLock<HashMap<(UserId, String), ByokRecord>>,
    balances: RwLock<HashMap<UserId, BalanceRow>>,
    usage: RwLock<Vec<UsageEvent>>,
    reservations: RwLock<HashMap<Uuid, ReservationRow>>,
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ByokStore for MemoryStore {
    async fn upsert(&self, record: ByokRecord) -> StorageResult<()> {
        let key = (record.user.clone(), record.provider.clone());
        self.byok.write().await.insert(key, record);
        Ok(())
    }

    async fn get(&self, user: &UserId, provider: &str) -> StorageResult<Option<ByokRecord>> {
        let key = (user.clone(), provider.to_string());
        Ok(self.byok.read().await.get(&key).cloned())
    }

    async fn remove(&self, user: &UserId, provider: &str) -> StorageResult<bool> {
        let key = (user.clone(), provider.to_string());
        Ok(self.byok.write().await.remove(&key).is_some())
    }

    async fn providers_for(&self, user: &UserId) -> StorageResult<Vec<String>> {
        let guard = self.byok.read().await;
        let mut providers: Vec<String> = guard
            .keys()
            .filter(|(owner, _)| owner == user)
            .map(|(_, provider)| provider.clone())
            .collect();
        providers.sort();
        Ok(providers)
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn get(&self, user: &UserId) -> StorageResult<Option<BalanceRow>> {
        Ok(self.balances.read().await.get(user).cloned())
    }

    async fn put(&self, row: BalanceRow) -> StorageResult<()> {
        self.balances.write().await.insert(row.user.clone(), row);
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn append(&self, event: UsageEvent) -> StorageResult<()> {
        self.usage.write().await.push(event);
        Ok(())
    }

    async fn list(
        &self,
        user: &UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<UsageEvent>> {
        let guard = self.usage.read().await;
        let mut events: Vec<UsageEvent> = guard
            .iter()
            .filter(|e| &e.user == user)
            .filter(|e| before.is_none_or(|cursor| e.occurred_at < cursor))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn by_reservation(&self, reservation: Uuid) -> StorageResult<Option<UsageEvent>> {
        let guard = self.usage.read().await;
        Ok(guard
            .iter()
            .find(|e| e.reservation_id == Some(reservation))
            .cloned())
    }

    async fn since(&self, user: &UserId, cutoff: DateTime<Utc>) -> StorageResult<Vec<UsageEvent>> {
        let guard = self.usage.read().await;
        let mut events: Vec<UsageEvent> = guard
            .iter()
            .filter(|e| &e.user == user && e.occurred_at >= cutoff)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(events)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert(&self, row: ReservationRow) -> StorageResult<()> {
        self.reservations.write().await.insert(row.id, row);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<ReservationRow>> {
        Ok(self.reservations.read().await.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> StorageResult<bool> {
        let mut guard = self.reservations.write().await;
        match guard.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn held_for(&self, user: &UserId) -> StorageResult<Vec<ReservationRow>> {
        let guard = self.reservations.read().await;
        Ok(guard
            .values()
            .filter(|r| &r.user == user && r.status == ReservationStatus::Held)
            .cloned()
            .collect())
    }

    async fn held_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<ReservationRow>> {
        let guard = self.reservations.read().await;
        Ok(guard
            .values()
            .filter(|r| r.status == ReservationStatus::Held && r.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, user: &UserId) -> StorageResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(user).cloned())
    }

    async fn put(&self, profile: UserProfile) -> StorageResult<()> {
        self.users.write().await.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.users.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KdfParams, UsageKind};

    fn byok_record(user: &str, provider: &str) -> ByokRecord {
        ByokRecord {
            user: UserId::new(user),
            provider: provider.to_string(),
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 24],
            kdf: KdfParams {
                salt: vec![9; 16],
                memory_kib: 19456,
                iterations: 2,
                parallelism: 1,
            },
            created_at: Utc::now(),
            rotated_at: None,
        }
    }

    #[tokio::test]
    async fn test_byok_upsert_get_remove() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");

        store.upsert(byok_record("u1", "anthropic")).await.unwrap();
        assert!(ByokStore::get(&store, &user, "anthropic").await.unwrap().is_some());
        assert_eq!(store.providers_for(&user).await.unwrap(), vec!["anthropic"]);

        assert!(store.remove(&user, "anthropic").await.unwrap());
        // Second delete is a no-op, not an error.
        assert!(!store.remove(&user, "anthropic").await.unwrap());
        assert!(ByokStore::get(&store, &user, "anthropic").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reservation_cas() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .insert(ReservationRow {
                id,
                user: UserId::new("u1"),
                estimated_tokens: 100,
                price_per_token: 0.000_003,
                created_at: Utc::now(),
                status: ReservationStatus::Held,
            })
            .await
            .unwrap();

        assert!(
            store
                .transition(id, ReservationStatus::Held, ReservationStatus::Committed)
                .await
                .unwrap()
        );
        // Replay fails the CAS.
        assert!(
            !store
                .transition(id, ReservationStatus::Held, ReservationStatus::Committed)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_usage_list_pagination() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let base = Utc::now();
        for i in 0..5_i64 {
            store
                .append(UsageEvent {
                    id: Uuid::new_v4(),
                    user: user.clone(),
                    provider: "anthropic".into(),
                    model: "m".into(),
                    input_tokens: 1,
                    output_tokens: 1,
                    cost_usd: 0.0,
                    platform_fee_usd: None,
                    reservation_id: None,
                    kind: UsageKind::Metered,
                    occurred_at: base + chrono::Duration::seconds(i),
                })
                .await
                .unwrap();
        }

        let page = store.list(&user, 2, None).await.unwrap();
        assert_eq!(page.len(), 2);
        // Most recent first.
        assert!(page[0].occurred_at > page[1].occurred_at);

        let older = store.list(&user, 10, Some(page[1].occurred_at)).await.unwrap();
        assert_eq!(older.len(), 3);
    }
}
