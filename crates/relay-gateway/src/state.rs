//! Gateway assembly: configuration → the running component stack.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_config::{GatewayConfig, KeySource, ModelRestrictions, ProviderSelection};
use relay_core::{GatewayResult, SecretString, UserId, UserProfile};
use relay_ledger::{LedgerSettings, TokenLedger, spawn_sweeper};
use relay_llm::{ConcurrencyLimited, build_adapter};
use relay_policy::{CompiledRestrictions, PolicyConfig};
use relay_registry::{
    ConfiguredProvider, Registry, RegistrySettings, builtin_provider, spawn_refresher,
};
use relay_storage::StorageAdapter;
use relay_vault::SecretVault;
use relay_workspace::{ClientWorkspaceRegistry, WorkspaceDef, WorkspaceRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::error::from_storage;
use crate::ratelimit::RateLimiter;

/// One provider after config normalization, env detection, and builtin
/// defaulting.
#[derive(Debug)]
struct ResolvedProvider {
    id: String,
    display_name: String,
    kind: String,
    base_url: Option<String>,
    default_model: Option<String>,
    system_prompt: Option<String>,
    server_key: Option<SecretString>,
    byok_eligible: bool,
    /// Admitted outright (vs. reachable only through BYOK).
    allowed: bool,
    restrictions: ModelRestrictions,
}

/// The assembled gateway.
pub struct Gateway {
    /// Loaded configuration.
    pub config: GatewayConfig,
    /// Storage adapter bundle.
    pub storage: StorageAdapter,
    /// Provider/model catalog.
    pub registry: Arc<Registry>,
    /// Admission policy.
    pub policy: PolicyConfig,
    /// BYOK secret store.
    pub vault: SecretVault,
    /// Token ledger.
    pub ledger: Arc<TokenLedger>,
    /// Server workspaces.
    pub workspaces: WorkspaceRegistry,
    /// Client-announced workspaces (advisory).
    pub client_workspaces: ClientWorkspaceRegistry,
    /// Bearer-token verifier.
    pub authenticator: Authenticator,
    /// Local rate limiter.
    pub rate: RateLimiter,
    /// Process start time.
    pub started_at: DateTime<Utc>,
    adapters: HashMap<String, Arc<ConcurrencyLimited>>,
    server_keys: HashMap<String, SecretString>,
    system_prompts: HashMap<String, String>,
}

impl Gateway {
    /// Assemble with in-memory storage (dev and tests).
    #[must_use]
    pub fn from_config(config: GatewayConfig) -> Self {
        Self::with_storage(config, StorageAdapter::in_memory())
    }

    /// Assemble over an explicit storage adapter.
    #[must_use]
    pub fn with_storage(config: GatewayConfig, storage: StorageAdapter) -> Self {
        let selection = relay_config::normalize::normalize_providers(config.providers.as_deref());
        let resolved = resolve_providers(&selection, &config.byok_providers);

        let policy = build_policy(&selection, &resolved, &config.byok_providers);
        let registry = Arc::new(Registry::new(
            resolved
                .iter()
                .map(|p| ConfiguredProvider {
                    id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    kind: p.kind.clone(),
                    base_url: p.base_url.clone(),
                    default_model: p.default_model.clone(),
                    server_key: p.server_key.is_some(),
                    byok_eligible: p.byok_eligible,
                })
                .collect(),
            RegistrySettings {
                catalog_url: config.registry.catalog_url.clone(),
                refresh_interval_secs: config.registry.refresh_interval_secs,
                backoff_cap_secs: config.registry.backoff_cap_secs,
            },
        ));

        let mut adapters = HashMap::new();
        let mut server_keys = HashMap::new();
        let mut system_prompts = HashMap::new();
        for provider in resolved {
            match build_adapter(&provider.kind, provider.base_url.clone()) {
                Some(adapter) => {
                    adapters.insert(
                        provider.id.clone(),
                        Arc::new(ConcurrencyLimited::new(adapter)),
                    );
                },
                None => {
                    warn!(provider = %provider.id, kind = %provider.kind, "No adapter for kind");
                },
            }
            if let Some(key) = provider.server_key {
                server_keys.insert(provider.id.clone(), key);
            }
            if let Some(prompt) = provider.system_prompt {
                system_prompts.insert(provider.id, prompt);
            }
        }

        let ledger = Arc::new(TokenLedger::new(
            storage.balances.clone(),
            storage.reservations.clone(),
            storage.usage.clone(),
            LedgerSettings {
                reservation_ttl: Duration::from_secs(config.ledger.reservation_ttl_secs),
                sweep_interval: Duration::from_secs(config.ledger.sweep_interval_secs),
                platform_fee_rate: config.ledger.platform_fee_rate,
            },
        ));

        let workspaces = WorkspaceRegistry::from_defs(
            config.workspaces.iter().map(workspace_def).collect(),
        );

        let authenticator = Authenticator::new(&config.auth.tokens, &config.auth.admin_tokens);
        let rate = RateLimiter::new(config.rate_limits.clone());
        let vault = SecretVault::new(storage.byok.clone());

        info!(
            providers = adapters.len(),
            workspaces = config.workspaces.len(),
            "Gateway assembled"
        );

        Self {
            config,
            storage,
            registry,
            policy,
            vault,
            ledger,
            workspaces,
            client_workspaces: ClientWorkspaceRegistry::new(),
            authenticator,
            rate,
            started_at: Utc::now(),
            adapters,
            server_keys,
            system_prompts,
        }
    }

    /// The adapter serving a provider id.
    #[must_use]
    pub fn adapter(&self, provider: &str) -> Option<Arc<ConcurrencyLimited>> {
        self.adapters.get(provider).cloned()
    }

    /// Replace the adapter for a provider (embedders and test harnesses).
    pub fn set_adapter(
        &mut self,
        provider: impl Into<String>,
        adapter: Arc<dyn relay_llm::TextProvider>,
    ) {
        self.adapters
            .insert(provider.into(), Arc::new(ConcurrencyLimited::new(adapter)));
    }

    /// The configured server key for a provider.
    #[must_use]
    pub fn server_key(&self, provider: &str) -> Option<&SecretString> {
        self.server_keys.get(provider)
    }

    /// The configured default system prompt for a provider.
    #[must_use]
    pub fn system_prompt(&self, provider: &str) -> Option<&str> {
        self.system_prompts.get(provider).map(String::as_str)
    }

    /// When exactly one provider is admitted outright, its id - the
    /// fallback for requests that name no provider.
    #[must_use]
    pub fn single_provider(&self) -> Option<String> {
        if self.policy.allowed.len() == 1 {
            self.policy.allowed.iter().next().cloned()
        } else {
            None
        }
    }

    /// Overall per-request deadline.
    #[must_use]
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.config.server.request_deadline_secs)
    }

    /// Fetch-or-create the profile for an authenticated caller.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error on storage failure.
    pub async fn ensure_user(&self, user: &UserId) -> GatewayResult<UserProfile> {
        if let Some(profile) = self.storage.users.get(user).await.map_err(from_storage)? {
            return Ok(profile);
        }
        let profile = UserProfile::new(user.clone(), user.as_str());
        self.storage
            .users
            .put(profile.clone())
            .await
            .map_err(from_storage)?;
        info!(user = %user, "Created user on first authenticated call");
        Ok(profile)
    }

    /// Spawn the sweeper and catalog refresher. Both stop when `shutdown`
    /// is cancelled.
    #[must_use]
    pub fn spawn_background(
        &self,
        shutdown: &CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            spawn_sweeper(Arc::clone(&self.ledger), shutdown.clone()),
            spawn_refresher(Arc::clone(&self.registry), shutdown.clone()),
        ]
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.adapters.len())
            .finish_non_exhaustive()
    }
}

fn workspace_def(section: &relay_config::WorkspaceSection) -> WorkspaceDef {
    WorkspaceDef {
        id: section.id.clone(),
        root: section.root.clone(),
        name: section.name.clone(),
        read_only: section.read_only,
        allow: section.allow.clone(),
        block: section.block.clone(),
        allowed_extensions: section.allowed_extensions.clone(),
        blocked_extensions: section.blocked_extensions.clone(),
        max_file_size: section.max_file_size,
        follow_symlinks: section.follow_symlinks,
        max_entries: section.max_entries,
    }
}

/// Resolve the provider selection into concrete providers.
fn resolve_providers(
    selection: &ProviderSelection,
    byok_providers: &[String],
) -> Vec<ResolvedProvider> {
    let mut resolved: Vec<ResolvedProvider> = Vec::new();

    match selection {
        ProviderSelection::Auto => {
            // Enable every builtin whose key is present in the environment.
            for builtin in relay_registry::BUILTIN_PROVIDERS {
                let key = read_env_key(builtin.env_key);
                if let Some(key) = key {
                    resolved.push(ResolvedProvider {
                        id: builtin.id.to_string(),
                        display_name: builtin.name.to_string(),
                        kind: builtin.kind.to_string(),
                        base_url: builtin.default_base_url.map(str::to_string),
                        default_model: Some(builtin.default_model.to_string()),
                        system_prompt: None,
                        server_key: Some(key),
                        byok_eligible: true,
                        allowed: true,
                        restrictions: ModelRestrictions::default(),
                    });
                }
            }
        },
        ProviderSelection::Explicit(entries) => {
            for entry in entries {
                let builtin = builtin_provider(&entry.name);
                let kind = entry
                    .kind
                    .clone()
                    .or_else(|| builtin.map(|b| b.kind.to_string()))
                    .unwrap_or_else(|| "openai".to_string());
                let base_url = entry
                    .base_url
                    .clone()
                    .or_else(|| builtin.and_then(|b| b.default_base_url.map(str::to_string)));
                let server_key = match &entry.key {
                    Some(KeySource::Inline { value }) => Some(value.clone()),
                    Some(KeySource::Env { var }) => read_env_key(var),
                    None => builtin.and_then(|b| read_env_key(b.env_key)),
                };
                resolved.push(ResolvedProvider {
                    id: entry.name.clone(),
                    display_name: builtin
                        .map_or_else(|| entry.name.clone(), |b| b.name.to_string()),
                    kind,
                    base_url,
                    default_model: entry
                        .default_model
                        .clone()
                        .or_else(|| builtin.map(|b| b.default_model.to_string())),
                    system_prompt: entry.system_prompt.clone(),
                    server_key,
                    byok_eligible: true,
                    allowed: true,
                    restrictions: entry.restrictions.clone(),
                });
            }
        },
    }

    // BYOK-only providers: reachable with user keys even when absent from
    // (or excluded by) the main selection.
    for name in byok_providers {
        if resolved.iter().any(|p| p.id == *name) {
            continue;
        }
        let builtin = builtin_provider(name);
        resolved.push(ResolvedProvider {
            id: name.clone(),
            display_name: builtin.map_or_else(|| name.clone(), |b| b.name.to_string()),
            kind: builtin.map_or_else(|| "openai".to_string(), |b| b.kind.to_string()),
            base_url: builtin.and_then(|b| b.default_base_url.map(str::to_string)),
            default_model: builtin.map(|b| b.default_model.to_string()),
            system_prompt: None,
            server_key: None,
            byok_eligible: true,
            allowed: false,
            restrictions: ModelRestrictions::default(),
        });
    }

    resolved
}

fn build_policy(
    selection: &ProviderSelection,
    resolved: &[ResolvedProvider],
    byok_providers: &[String],
) -> PolicyConfig {
    let allowed: BTreeSet<String> = resolved
        .iter()
        .filter(|p| p.allowed)
        .map(|p| p.id.clone())
        .collect();

    let mut restrictions = BTreeMap::new();
    for provider in resolved {
        if provider.restrictions.allowed_models.is_empty()
            && provider.restrictions.blocked_models.is_empty()
        {
            continue;
        }
        restrictions.insert(
            provider.id.clone(),
            CompiledRestrictions::new(
                &provider.restrictions.allowed_models,
                &provider.restrictions.blocked_models,
            ),
        );
    }

    PolicyConfig {
        allowed,
        byok_any: selection.is_auto(),
        byok_providers: byok_providers.iter().cloned().collect(),
        restrictions,
    }
}

/// Read a key from the environment, treating empty values as absent.
fn read_env_key(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_llm::TextProvider;

    #[test]
    fn test_explicit_selection_builds_policy_and_adapters() {
        let config = relay_config::from_str(
            r#"
            providers = [
                "anthropic",
                { name = "deepseek", type = "openai", base_url = "https://api.deepseek.com/v1", api_key = "sk-d" },
            ]
            byok_providers = ["google"]
            "#,
        )
        .unwrap();
        let gateway = Gateway::from_config(config);

        assert!(gateway.policy.allowed.contains("anthropic"));
        assert!(gateway.policy.allowed.contains("deepseek"));
        assert!(!gateway.policy.allowed.contains("google"));
        assert!(gateway.policy.byok_providers.contains("google"));
        assert!(!gateway.policy.byok_any);

        // deepseek got an inline key and the OpenAI adapter.
        assert!(gateway.server_key("deepseek").is_some());
        assert_eq!(gateway.adapter("deepseek").unwrap().kind(), "openai");
        // google is reachable (BYOK) but holds no server key.
        assert!(gateway.adapter("google").is_some());
        assert!(gateway.server_key("google").is_none());
    }

    #[test]
    fn test_empty_providers_blocks_all() {
        let config = relay_config::from_str("providers = []").unwrap();
        let gateway = Gateway::from_config(config);
        assert!(gateway.policy.allowed.is_empty());
        assert!(!gateway.policy.byok_any);
        assert!(gateway.single_provider().is_none());
    }

    #[test]
    fn test_single_provider_fallback() {
        let config = relay_config::from_str(r#"providers = ["anthropic"]"#).unwrap();
        let gateway = Gateway::from_config(config);
        assert_eq!(gateway.single_provider().as_deref(), Some("anthropic"));
    }

    #[tokio::test]
    async fn test_ensure_user_creates_once() {
        let config = relay_config::GatewayConfig::default();
        let gateway = Gateway::from_config(config);
        let user = UserId::new("alice@example.com");

        let first = gateway.ensure_user(&user).await.unwrap();
        let second = gateway.ensure_user(&user).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(gateway.storage.users.count().await.unwrap(), 1);
    }
}
