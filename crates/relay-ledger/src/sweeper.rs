//! Background reservation sweeper.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ledger::TokenLedger;

/// Spawn the sweeper task.
///
/// One per process. Scans at the configured interval, expires holds older
/// than the reservation TTL, and exits when `shutdown` is cancelled. Holds
/// no long locks: each expiry takes only the owning user's lock, briefly.
#[must_use]
pub fn spawn_sweeper(
    ledger: Arc<TokenLedger>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = ledger.settings().sweep_interval;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {},
            }

            match ledger.sweep_expired(Utc::now()).await {
                Ok(0) => {},
                Ok(count) => debug!(count, "Sweeper reclaimed expired reservations"),
                Err(e) => warn!(error = %e, "Sweeper scan failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerSettings;
    use relay_core::{BalancePool, UserId};
    use relay_storage::StorageAdapter;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweeper_reclaims_and_shuts_down() {
        let storage = StorageAdapter::in_memory();
        let ledger = Arc::new(TokenLedger::new(
            storage.balances.clone(),
            storage.reservations.clone(),
            storage.usage.clone(),
            LedgerSettings {
                reservation_ttl: Duration::from_millis(10),
                sweep_interval: Duration::from_millis(20),
                platform_fee_rate: 0.0,
            },
        ));
        let user = UserId::new("u1");
        ledger.grant(&user, 100, BalancePool::Prepaid).await.unwrap();
        ledger.reserve(&user, 100, 0.0, false).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(Arc::clone(&ledger), shutdown.clone());

        // Wait for at least one sweep past the TTL.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ledger.balance(&user).await.unwrap().held_tokens, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper must stop on shutdown")
            .unwrap();
    }
}
