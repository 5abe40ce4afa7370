//! Background catalog refresher.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::Registry;

/// Initial retry delay after a failed refresh.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Spawn the refresher task.
///
/// Attempts a live refresh immediately, then again every configured
/// interval. Failures retry with doubling backoff capped at the configured
/// ceiling. The task exits when `shutdown` is cancelled; when no catalog
/// URL is configured it exits immediately and the registry keeps serving
/// the fallback.
#[must_use]
pub fn spawn_refresher(
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if registry.settings().catalog_url.is_none() {
            debug!("No catalog URL configured; registry stays on fallback");
            return;
        }

        let steady = Duration::from_secs(registry.settings().refresh_interval_secs.max(1));
        let cap = Duration::from_secs(registry.settings().backoff_cap_secs.max(1));
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let delay = match registry.refresh().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                    steady
                },
                Err(e) => {
                    warn!(error = %e, retry_in_secs = backoff.as_secs(), "Catalog refresh failed");
                    let delay = backoff;
                    backoff = (backoff * 2).min(cap);
                    delay
                },
            };

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {},
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistrySettings;

    #[tokio::test]
    async fn test_exits_without_catalog_url() {
        let registry = Arc::new(Registry::new(Vec::new(), RegistrySettings::default()));
        let handle = spawn_refresher(registry, CancellationToken::new());
        // Task returns on its own; no shutdown needed.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_retry_loop() {
        let registry = Arc::new(Registry::new(
            Vec::new(),
            RegistrySettings {
                // Unroutable endpoint keeps the loop in backoff.
                catalog_url: Some("http://127.0.0.1:1/catalog".to_string()),
                refresh_interval_secs: 1,
                backoff_cap_secs: 1,
            },
        ));
        let shutdown = CancellationToken::new();
        let handle = spawn_refresher(registry, shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresher must stop on shutdown")
            .unwrap();
    }
}
