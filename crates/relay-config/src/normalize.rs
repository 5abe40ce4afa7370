//! Provider-entry normalization.
//!
//! TOML accepts two spellings per entry - a bare name or a full table -
//! and the `providers` key itself has three-valued semantics (absent,
//! empty, explicit). Both collapse here into [`ProviderSelection`] holding
//! tagged [`ProviderEntry`] records, so nothing downstream re-inspects raw
//! config shapes.

use relay_core::SecretString;
use serde::Deserialize;

use crate::types::RawProviderEntry;

/// Where a provider's server key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Read from an environment variable at resolution time.
    Env {
        /// The variable name, e.g. `ANTHROPIC_API_KEY`.
        var: String,
    },
    /// Declared inline in the config file.
    Inline {
        /// The key material.
        value: SecretString,
    },
}

/// Model allow/deny globs as written in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RawRestrictions {
    /// Allow globs; non-empty means a model must match one.
    pub allowed_models: Vec<String>,
    /// Deny globs; any match rejects.
    pub blocked_models: Vec<String>,
}

/// Compiled model restrictions.
#[derive(Debug, Clone, Default)]
pub struct ModelRestrictions {
    /// Allow globs; non-empty means a model must match one.
    pub allowed_models: Vec<String>,
    /// Deny globs; any match rejects.
    pub blocked_models: Vec<String>,
}

impl From<RawRestrictions> for ModelRestrictions {
    fn from(raw: RawRestrictions) -> Self {
        Self {
            allowed_models: raw.allowed_models,
            blocked_models: raw.blocked_models,
        }
    }
}

/// One normalized provider entry.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    /// Provider name (builtin id or user-declared).
    pub name: String,
    /// Server key source. `None` means the entry relies on the builtin
    /// environment variable for its name, resolved later.
    pub key: Option<KeySource>,
    /// Adapter kind alias; `None` means "builtin kind for this name".
    pub kind: Option<String>,
    /// Endpoint override.
    pub base_url: Option<String>,
    /// Default model when the request names none.
    pub default_model: Option<String>,
    /// Default system prompt.
    pub system_prompt: Option<String>,
    /// Model allow/deny globs.
    pub restrictions: ModelRestrictions,
}

impl ProviderEntry {
    /// Shorthand entry: just a name, everything else defaulted.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            kind: None,
            base_url: None,
            default_model: None,
            system_prompt: None,
            restrictions: ModelRestrictions::default(),
        }
    }
}

/// The three-valued `providers` semantics, resolved.
#[derive(Debug, Clone)]
pub enum ProviderSelection {
    /// `providers` was absent: detect from server-key environment
    /// variables, BYOK-any mode.
    Auto,
    /// `providers` was present. An empty list blocks all providers.
    Explicit(Vec<ProviderEntry>),
}

impl ProviderSelection {
    /// Whether this selection came from auto-detection.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Normalize the raw `providers` key.
#[must_use]
pub fn normalize_providers(raw: Option<&[RawProviderEntry]>) -> ProviderSelection {
    match raw {
        None => ProviderSelection::Auto,
        Some(entries) => {
            let normalized = entries
                .iter()
                .map(|entry| match entry {
                    RawProviderEntry::Name(name) => ProviderEntry::named(name.clone()),
                    RawProviderEntry::Full(table) => ProviderEntry {
                        name: table.name.clone(),
                        key: table.api_key.clone().map(|value| KeySource::Inline {
                            value: SecretString::new(value),
                        }),
                        kind: table.kind.clone(),
                        base_url: table.base_url.clone(),
                        default_model: table.default_model.clone(),
                        system_prompt: table.system_prompt.clone(),
                        restrictions: table.model_restrictions.clone().into(),
                    },
                })
                .collect();
            ProviderSelection::Explicit(normalized)
        },
    }
}
