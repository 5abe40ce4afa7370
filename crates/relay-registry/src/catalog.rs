//! Catalog document types and the frozen fallback.

use serde::{Deserialize, Serialize};

/// Capability tags a model may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelCapability {
    /// Function/tool calling.
    ToolUse,
    /// Provider-native web browsing.
    WebSearch,
    /// Image input.
    Vision,
}

/// Metadata for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Provider-scoped model identifier.
    pub id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: String,
    /// Context window, tokens.
    pub context_window: u32,
    /// USD per million input tokens.
    pub input_price_per_mtok: f64,
    /// USD per million output tokens.
    pub output_price_per_mtok: f64,
    /// Capability tags.
    #[serde(default)]
    pub capabilities: Vec<ModelCapability>,
}

impl ModelInfo {
    /// Conservative per-token USD price used for reservations: the dearer
    /// of the input and output rates.
    #[must_use]
    pub fn reserve_price_per_token(&self) -> f64 {
        self.input_price_per_mtok.max(self.output_price_per_mtok) / 1_000_000.0
    }

    /// Exact USD cost for a settled request.
    #[must_use]
    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input = input_tokens as f64 * self.input_price_per_mtok / 1_000_000.0;
        let output = output_tokens as f64 * self.output_price_per_mtok / 1_000_000.0;
        input + output
    }

    /// A placeholder entry for models the catalog does not know.
    ///
    /// User-declared OpenAI-compatible providers routinely serve models the
    /// catalog has never heard of; they get a generic context window and
    /// zero pricing (metering then charges nothing beyond the flat token
    /// count, which is what an unknown price honestly supports).
    #[must_use]
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            context_window: 128_000,
            input_price_per_mtok: 0.0,
            output_price_per_mtok: 0.0,
            capabilities: Vec::new(),
        }
    }
}

/// One provider's slice of the catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCatalog {
    /// Provider id.
    pub id: String,
    /// Models known for this provider.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// The catalog document shape shared by the live endpoint and the frozen
/// fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Per-provider model lists.
    pub providers: Vec<ProviderCatalog>,
}

/// Which source produced the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    /// Fetched from the live endpoint.
    Live,
    /// The bundled frozen document.
    Fallback,
}

/// A pricing override applied strictly above live data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingOverride {
    /// Provider scope.
    pub provider: String,
    /// Exact model id the override applies to.
    pub model: String,
    /// Replacement USD per million input tokens.
    pub input_price_per_mtok: f64,
    /// Replacement USD per million output tokens.
    pub output_price_per_mtok: f64,
}

/// Frozen fallback catalog bundled into the binary.
const FALLBACK_JSON: &str = include_str!("../data/fallback_catalog.json");

/// Parse the bundled fallback document.
///
/// # Panics
///
/// Panics if the bundled document is malformed, which is a build defect.
#[must_use]
pub fn fallback_catalog() -> CatalogDocument {
    serde_json::from_str(FALLBACK_JSON).expect("bundled fallback_catalog.json must be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_parses_and_covers_builtins() {
        let doc = fallback_catalog();
        for builtin in crate::builtin::BUILTIN_PROVIDERS {
            assert!(
                doc.providers.iter().any(|p| p.id == builtin.id),
                "fallback catalog missing {}",
                builtin.id
            );
        }
    }

    #[test]
    fn test_fallback_default_models_resolve() {
        let doc = fallback_catalog();
        for builtin in crate::builtin::BUILTIN_PROVIDERS {
            let provider = doc.providers.iter().find(|p| p.id == builtin.id).unwrap();
            assert!(
                provider.models.iter().any(|m| m.id == builtin.default_model),
                "default model {} missing from {} fallback",
                builtin.default_model,
                builtin.id
            );
        }
    }

    #[test]
    fn test_reserve_price_takes_dearer_rate() {
        let model = ModelInfo {
            id: "m".into(),
            display_name: String::new(),
            context_window: 8192,
            input_price_per_mtok: 3.0,
            output_price_per_mtok: 15.0,
            capabilities: vec![],
        };
        assert!((model.reserve_price_per_token() - 15.0 / 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cost_usd() {
        let model = ModelInfo {
            id: "m".into(),
            display_name: String::new(),
            context_window: 8192,
            input_price_per_mtok: 3.0,
            output_price_per_mtok: 15.0,
            capabilities: vec![],
        };
        let cost = model.cost_usd(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }
}
