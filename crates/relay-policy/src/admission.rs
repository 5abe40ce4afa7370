//! The admission decision.

use std::collections::{BTreeMap, BTreeSet};

use globset::{Glob, GlobMatcher};
use thiserror::Error;
use tracing::warn;

/// Caller classification as policy sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    /// No identity presented.
    Anonymous,
    /// Authenticated user.
    Authenticated,
}

/// Why admission was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The provider is outside the allow-list.
    #[error("provider not allowed: {provider}")]
    ProviderNotAllowed {
        /// The rejected provider.
        provider: String,
    },

    /// The model is outside the provider's restrictions.
    #[error("model not allowed: {model} (provider {provider})")]
    ModelNotAllowed {
        /// The provider in question.
        provider: String,
        /// The rejected model.
        model: String,
    },
}

/// Pre-compiled model allow/deny globs for one provider.
///
/// Compiled once at policy construction; bad patterns are logged and
/// skipped rather than failing the whole policy (the config layer already
/// validated them - this is the last line, not the first).
#[derive(Debug, Default)]
pub struct CompiledRestrictions {
    allow: Vec<GlobMatcher>,
    block: Vec<GlobMatcher>,
}

impl CompiledRestrictions {
    /// Compile from pattern lists.
    #[must_use]
    pub fn new(allowed: &[String], blocked: &[String]) -> Self {
        Self {
            allow: compile(allowed),
            block: compile(blocked),
        }
    }

    fn permits(&self, model: &str) -> bool {
        if self.block.iter().any(|m| m.is_match(model)) {
            return false;
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|m| m.is_match(model)) {
            return false;
        }
        true
    }
}

fn compile(patterns: &[String]) -> Vec<GlobMatcher> {
    patterns
        .iter()
        .filter_map(|pattern| match Glob::new(pattern) {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Failed to compile model glob");
                None
            },
        })
        .collect()
}

/// The policy's view of server configuration.
#[derive(Debug, Default)]
pub struct PolicyConfig {
    /// Providers admitted outright.
    pub allowed: BTreeSet<String>,
    /// Auto-detect mode: any provider passes when the caller is
    /// authenticated and brings BYOK material.
    pub byok_any: bool,
    /// Providers admitted for BYOK callers even if not in `allowed`.
    pub byok_providers: BTreeSet<String>,
    /// Per-provider model restrictions.
    pub restrictions: BTreeMap<String, CompiledRestrictions>,
}

/// One admission question.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    /// Requested provider.
    pub provider: &'a str,
    /// Requested model, if the caller named one.
    pub model: Option<&'a str>,
    /// The provider's default model, for effective-model resolution.
    pub default_model: Option<&'a str>,
    /// Caller classification.
    pub caller: CallerKind,
    /// Whether the caller has BYOK material for this provider.
    pub byok_present: bool,
}

impl PolicyConfig {
    /// Decide admission. On success, returns the effective model
    /// (explicit over default; `None` when neither exists, which the
    /// registry then reports as unresolvable).
    ///
    /// Decision order:
    /// 1. provider membership (allow-list, then the BYOK escape hatches)
    /// 2. deny globs against the effective model
    /// 3. allow globs against the effective model
    ///
    /// # Errors
    ///
    /// [`AdmissionError::ProviderNotAllowed`] or
    /// [`AdmissionError::ModelNotAllowed`].
    pub fn admit(&self, req: AdmissionRequest<'_>) -> Result<Option<String>, AdmissionError> {
        let byok_caller = req.caller == CallerKind::Authenticated && req.byok_present;
        let provider_ok = self.allowed.contains(req.provider)
            || (byok_caller
                && (self.byok_any || self.byok_providers.contains(req.provider)));
        if !provider_ok {
            return Err(AdmissionError::ProviderNotAllowed {
                provider: req.provider.to_string(),
            });
        }

        let effective = req.model.or(req.default_model);
        if let Some(model) = effective
            && let Some(restrictions) = self.restrictions.get(req.provider)
            && !restrictions.permits(model)
        {
            return Err(AdmissionError::ModelNotAllowed {
                provider: req.provider.to_string(),
                model: model.to_string(),
            });
        }

        Ok(effective.map(str::to_string))
    }

    /// Filter a model list through a provider's restrictions
    /// (`ai.listAllowedModels` support).
    #[must_use]
    pub fn filter_models<'m>(&self, provider: &str, models: &'m [String]) -> Vec<&'m String> {
        match self.restrictions.get(provider) {
            Some(restrictions) => models.iter().filter(|m| restrictions.permits(m)).collect(),
            None => models.iter().collect(),
        }
    }
}
