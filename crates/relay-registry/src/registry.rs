//! The registry itself: configured providers x catalog data, snapshot reads.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{
    CatalogDocument, CatalogSource, ModelInfo, PricingOverride, fallback_catalog,
};
use crate::error::{RegistryError, RegistryResult};

/// A provider as the gateway configured it (after normalization and
/// environment auto-detection).
#[derive(Debug, Clone)]
pub struct ConfiguredProvider {
    /// Provider id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Adapter kind alias.
    pub kind: String,
    /// Endpoint override.
    pub base_url: Option<String>,
    /// Configured default model, if any.
    pub default_model: Option<String>,
    /// Whether a server key is configured for this provider.
    pub server_key: bool,
    /// Whether BYOK credentials are accepted for this provider.
    pub byok_eligible: bool,
}

/// One provider's entry in a snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    /// Provider id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Adapter kind alias.
    pub kind: String,
    /// Endpoint override.
    pub base_url: Option<String>,
    /// Effective default model.
    pub default_model: Option<String>,
    /// Whether a server key is configured.
    pub server_key: bool,
    /// Whether BYOK credentials are accepted.
    pub byok_eligible: bool,
    /// Whether the catalog knows this provider (unknown configured
    /// providers surface with no models and `available = false`).
    pub available: bool,
    /// Models, with overrides applied.
    pub models: Vec<ModelInfo>,
}

/// An immutable, consistent view of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// Providers keyed by id.
    pub providers: BTreeMap<String, ProviderEntry>,
    /// Which source produced the model data.
    pub source: CatalogSource,
    /// When the source data was last refreshed.
    pub last_refresh_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Total model count across providers.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.providers.values().map(|p| p.models.len()).sum()
    }
}

/// Registry health, as reported by `ai.getRegistryHealth`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    /// Whether any snapshot is being served.
    pub ready: bool,
    /// Current data source.
    pub source: CatalogSource,
    /// Last successful refresh.
    pub last_refresh_at: Option<DateTime<Utc>>,
    /// Total models in the snapshot.
    pub model_count: usize,
}

/// Registry behaviour knobs (mapped from the `[registry]` config section).
#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    /// Live catalog endpoint; `None` disables live refresh.
    pub catalog_url: Option<String>,
    /// Steady-state refresh interval, seconds.
    pub refresh_interval_secs: u64,
    /// Backoff ceiling for failed refreshes, seconds.
    pub backoff_cap_secs: u64,
}

/// The provider/model registry.
///
/// Many readers, one writer: reads clone an `Arc` to the current snapshot
/// under a brief lock; refreshes and override changes build a replacement
/// snapshot off-lock and swap it in.
pub struct Registry {
    configured: Vec<ConfiguredProvider>,
    settings: RegistrySettings,
    http: reqwest::Client,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Source document of the current snapshot, kept so overrides can be
    /// re-applied without refetching.
    base: RwLock<(CatalogDocument, CatalogSource, Option<DateTime<Utc>>)>,
    overrides: RwLock<Vec<PricingOverride>>,
}

impl Registry {
    /// Build a registry serving the frozen fallback.
    ///
    /// The first live refresh (if a catalog URL is configured) is the
    /// refresher task's job; construction never touches the network.
    #[must_use]
    pub fn new(configured: Vec<ConfiguredProvider>, settings: RegistrySettings) -> Self {
        let document = fallback_catalog();
        let snapshot = build_snapshot(&configured, &document, CatalogSource::Fallback, None, &[]);
        Self {
            configured,
            settings,
            http: reqwest::Client::new(),
            snapshot: RwLock::new(Arc::new(snapshot)),
            base: RwLock::new((document, CatalogSource::Fallback, None)),
            overrides: RwLock::new(Vec::new()),
        }
    }

    /// Registry behaviour knobs.
    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// The current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the snapshot lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// All configured providers.
    #[must_use]
    pub fn list_providers(&self) -> Vec<ProviderEntry> {
        self.snapshot().providers.values().cloned().collect()
    }

    /// Configured providers accepting BYOK credentials.
    #[must_use]
    pub fn list_byok_providers(&self) -> Vec<ProviderEntry> {
        self.snapshot()
            .providers
            .values()
            .filter(|p| p.byok_eligible)
            .cloned()
            .collect()
    }

    /// One provider's entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProvider`] when the provider is not
    /// configured.
    pub fn provider(&self, id: &str) -> RegistryResult<ProviderEntry> {
        self.snapshot()
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))
    }

    /// All models the catalog knows for a provider.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProvider`] when the provider is not
    /// configured.
    pub fn list_models(&self, provider: &str) -> RegistryResult<Vec<ModelInfo>> {
        Ok(self.provider(provider)?.models)
    }

    /// Resolve the effective model for a request: the explicit id when
    /// given, else the provider's default.
    ///
    /// Explicit ids unknown to the catalog resolve to a placeholder entry
    /// so user-declared providers keep working; the placeholder carries
    /// zero pricing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProvider`] for unconfigured
    /// providers and [`RegistryError::NoModel`] when nothing resolves.
    pub fn resolve_model(&self, provider: &str, model: Option<&str>) -> RegistryResult<ModelInfo> {
        let entry = self.provider(provider)?;
        match model {
            Some(id) => Ok(entry
                .models
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .unwrap_or_else(|| ModelInfo::unknown(id))),
            None => {
                let default_id = entry.default_model.ok_or_else(|| RegistryError::NoModel {
                    provider: provider.to_string(),
                })?;
                Ok(entry
                    .models
                    .iter()
                    .find(|m| m.id == default_id)
                    .cloned()
                    .unwrap_or_else(|| ModelInfo::unknown(default_id)))
            },
        }
    }

    /// Add a pricing override and republish the snapshot.
    ///
    /// # Panics
    ///
    /// Panics if a registry lock is poisoned.
    pub fn add_pricing_override(&self, scope: PricingOverride) {
        {
            let mut overrides = self.overrides.write().expect("overrides lock poisoned");
            // Last write wins per (provider, model).
            overrides.retain(|o| !(o.provider == scope.provider && o.model == scope.model));
            overrides.push(scope);
        }
        self.republish();
    }

    /// Drop all pricing overrides and republish (admin `clearCache`).
    ///
    /// # Panics
    ///
    /// Panics if a registry lock is poisoned.
    pub fn clear_overrides(&self) {
        self.overrides.write().expect("overrides lock poisoned").clear();
        self.republish();
    }

    /// Health summary.
    #[must_use]
    pub fn health(&self) -> RegistryHealth {
        let snapshot = self.snapshot();
        RegistryHealth {
            ready: true,
            source: snapshot.source,
            last_refresh_at: snapshot.last_refresh_at,
            model_count: snapshot.model_count(),
        }
    }

    /// Fetch the live catalog and swap it in.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Fetch`] when no URL is configured or the
    /// request fails, [`RegistryError::InvalidDocument`] on a bad body.
    pub async fn refresh(&self) -> RegistryResult<()> {
        let url = self
            .settings
            .catalog_url
            .as_deref()
            .ok_or_else(|| RegistryError::Fetch("no catalog URL configured".to_string()))?;

        let response = self
            .http
            .get(url)
            .timeout(std::time::Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| RegistryError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Fetch(format!(
                "catalog endpoint returned {}",
                response.status()
            )));
        }

        let document: CatalogDocument = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidDocument(e.to_string()))?;

        let now = Utc::now();
        {
            let mut base = self.base.write().expect("base lock poisoned");
            *base = (document, CatalogSource::Live, Some(now));
        }
        self.republish();
        info!(model_count = self.snapshot().model_count(), "Catalog refreshed from live source");
        Ok(())
    }

    /// Rebuild the snapshot from the stored base document plus overrides.
    fn republish(&self) {
        let (document, source, refreshed_at) = {
            let base = self.base.read().expect("base lock poisoned");
            base.clone()
        };
        let overrides = self.overrides.read().expect("overrides lock poisoned").clone();
        let snapshot =
            build_snapshot(&self.configured, &document, source, refreshed_at, &overrides);
        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.configured.len())
            .finish_non_exhaustive()
    }
}

/// Compose configured providers with a catalog document.
fn build_snapshot(
    configured: &[ConfiguredProvider],
    document: &CatalogDocument,
    source: CatalogSource,
    last_refresh_at: Option<DateTime<Utc>>,
    overrides: &[PricingOverride],
) -> CatalogSnapshot {
    let mut providers = BTreeMap::new();
    for cfg in configured {
        let catalog = document.providers.iter().find(|p| p.id == cfg.id);
        let mut models = catalog.map(|p| p.models.clone()).unwrap_or_default();

        for scope in overrides.iter().filter(|o| o.provider == cfg.id) {
            match models.iter_mut().find(|m| m.id == scope.model) {
                Some(model) => {
                    model.input_price_per_mtok = scope.input_price_per_mtok;
                    model.output_price_per_mtok = scope.output_price_per_mtok;
                },
                None => {
                    warn!(
                        provider = %scope.provider,
                        model = %scope.model,
                        "Pricing override targets a model absent from the catalog"
                    );
                },
            }
        }

        let available = !models.is_empty();
        let default_model = cfg.default_model.clone().or_else(|| {
            crate::builtin::builtin_provider(&cfg.id).map(|b| b.default_model.to_string())
        });

        providers.insert(
            cfg.id.clone(),
            ProviderEntry {
                id: cfg.id.clone(),
                display_name: cfg.display_name.clone(),
                kind: cfg.kind.clone(),
                base_url: cfg.base_url.clone(),
                default_model,
                server_key: cfg.server_key,
                byok_eligible: cfg.byok_eligible,
                available,
                models,
            },
        );
    }
    CatalogSnapshot {
        providers,
        source,
        last_refresh_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(id: &str) -> ConfiguredProvider {
        ConfiguredProvider {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: "openai".to_string(),
            base_url: None,
            default_model: None,
            server_key: true,
            byok_eligible: false,
        }
    }

    fn registry(ids: &[&str]) -> Registry {
        let providers = ids.iter().map(|id| configured(id)).collect();
        Registry::new(providers, RegistrySettings::default())
    }

    #[test]
    fn test_serves_fallback_on_construction() {
        let registry = registry(&["anthropic", "openai"]);
        let health = registry.health();
        assert!(health.ready);
        assert_eq!(health.source, CatalogSource::Fallback);
        assert!(health.model_count > 0);
        assert!(health.last_refresh_at.is_none());
    }

    #[test]
    fn test_unknown_configured_provider_has_no_models() {
        let registry = registry(&["deepseek"]);
        let entry = registry.provider("deepseek").unwrap();
        assert!(!entry.available);
        assert!(entry.models.is_empty());
    }

    #[test]
    fn test_unconfigured_provider_is_unknown() {
        let registry = registry(&["anthropic"]);
        assert!(matches!(
            registry.provider("openai"),
            Err(RegistryError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_resolve_model_explicit_and_default() {
        let registry = registry(&["anthropic"]);

        let explicit = registry
            .resolve_model("anthropic", Some("claude-3-5-haiku-20241022"))
            .unwrap();
        assert_eq!(explicit.id, "claude-3-5-haiku-20241022");

        // Builtin default applies when config names none.
        let default = registry.resolve_model("anthropic", None).unwrap();
        assert_eq!(default.id, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_resolve_unknown_model_synthesizes_placeholder() {
        let registry = registry(&["anthropic"]);
        let model = registry.resolve_model("anthropic", Some("brand-new")).unwrap();
        assert_eq!(model.id, "brand-new");
        assert!((model.input_price_per_mtok - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_override_applies_above_base_and_clears() {
        let registry = registry(&["anthropic"]);
        registry.add_pricing_override(PricingOverride {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            input_price_per_mtok: 1.0,
            output_price_per_mtok: 2.0,
        });

        let model = registry
            .resolve_model("anthropic", Some("claude-sonnet-4-20250514"))
            .unwrap();
        assert!((model.output_price_per_mtok - 2.0).abs() < f64::EPSILON);

        registry.clear_overrides();
        let model = registry
            .resolve_model("anthropic", Some("claude-sonnet-4-20250514"))
            .unwrap();
        assert!((model.output_price_per_mtok - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_byok_filter() {
        let mut provider = configured("anthropic");
        provider.byok_eligible = true;
        let registry = Registry::new(
            vec![provider, configured("openai")],
            RegistrySettings::default(),
        );
        let byok = registry.list_byok_providers();
        assert_eq!(byok.len(), 1);
        assert_eq!(byok[0].id, "anthropic");
    }
}
