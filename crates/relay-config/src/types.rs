//! Configuration sections.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::normalize::RawRestrictions;

/// Root gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct GatewayConfig {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Provider allow-list. Three cases:
    /// - absent → auto-detect from server-key environment variables (BYOK-any)
    /// - empty list → block all providers
    /// - explicit list → strict allow-list
    pub providers: Option<Vec<RawProviderEntry>>,
    /// Providers eligible for BYOK even when not in `providers`.
    pub byok_providers: Vec<String>,
    /// Input and output bounds.
    pub limits: LimitsSection,
    /// Metering behaviour.
    pub ledger: LedgerSection,
    /// Catalog registry behaviour.
    pub registry: RegistrySection,
    /// Local token-bucket rate limiting.
    pub rate_limits: RateLimitsSection,
    /// Authentication tokens.
    pub auth: AuthSection,
    /// Server workspace registrations.
    pub workspaces: Vec<WorkspaceSection>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address, `host:port`.
    pub listen: String,
    /// Overall deadline per `generateText` call, seconds.
    pub request_deadline_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4600".to_string(),
            request_deadline_secs: 300,
        }
    }
}

/// A provider entry as written in TOML: either a bare name or a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawProviderEntry {
    /// Shorthand: `providers = ["anthropic"]`. The key comes from the
    /// provider's well-known environment variable.
    Name(String),
    /// Full form with explicit fields.
    Full(RawProviderTable),
}

/// Full-form provider entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawProviderTable {
    /// Provider name (builtin id or a user-declared name).
    pub name: String,
    /// Inline API key. Omit to use the provider's environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default model when the request names none.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Default system prompt injected when the request carries none.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Adapter kind alias (`anthropic`, `openai`, `google`). Defaults to
    /// the builtin kind for known names, `openai` for declared ones.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Endpoint override; required for user-declared OpenAI-compatible
    /// providers.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model allow/deny globs.
    #[serde(default)]
    pub model_restrictions: RawRestrictions,
}

/// Input and output bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// `options.maxTokens` default when the request omits it.
    pub default_max_tokens: u32,
    /// Hard ceiling for `options.maxTokens`.
    pub max_max_tokens: u32,
    /// System prompt length cap, characters.
    pub system_prompt_max_length: usize,
    /// Content length cap, characters.
    pub content_max_length: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            default_max_tokens: 1024,
            max_max_tokens: 8192,
            system_prompt_max_length: 25_000,
            content_max_length: 200_000,
        }
    }
}

/// Metering behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Reservation expiry window, seconds. Must exceed the request
    /// deadline plus a safety margin.
    pub reservation_ttl_secs: u64,
    /// Sweeper scan interval, seconds.
    pub sweep_interval_secs: u64,
    /// Platform fee as a fraction of cost (0.05 = 5%). Applied to metered
    /// settlements only.
    pub platform_fee_rate: f64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 420,
            sweep_interval_secs: 30,
            platform_fee_rate: 0.0,
        }
    }
}

/// Catalog registry behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Live catalog endpoint. Absent → fallback only.
    pub catalog_url: Option<String>,
    /// Refresh interval once live data has been obtained, seconds.
    pub refresh_interval_secs: u64,
    /// Exponential backoff ceiling for failed refreshes, seconds.
    pub backoff_cap_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            catalog_url: None,
            refresh_interval_secs: 3600,
            backoff_cap_secs: 900,
        }
    }
}

/// Local token-bucket rate limiting.
///
/// Each identity holds two buckets: one for standard procedures and one
/// for expensive procedures (those that spend upstream provider
/// capacity), so cheap catalog reads and generation calls meter
/// separately.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitsSection {
    /// Sustained standard calls per minute per identity.
    pub per_identity_per_minute: u32,
    /// Standard burst capacity per identity.
    pub burst: u32,
    /// Sustained expensive calls per minute per identity.
    pub expensive_per_minute: u32,
    /// Expensive burst capacity per identity.
    pub expensive_burst: u32,
    /// Sustained calls per minute across all identities.
    pub global_per_minute: u32,
}

impl Default for RateLimitsSection {
    fn default() -> Self {
        Self {
            per_identity_per_minute: 60,
            burst: 10,
            expensive_per_minute: 20,
            expensive_burst: 5,
            global_per_minute: 1200,
        }
    }
}

/// Authentication tokens.
///
/// OAuth flows live outside the core; the gateway authenticates bearer
/// tokens declared here (or minted by an external issuer sharing this
/// table). Values are secret; the section never serializes back out.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Bearer token → user email.
    pub tokens: HashMap<String, String>,
    /// Bearer tokens granting operator (`admin.*`) procedures.
    pub admin_tokens: Vec<String>,
}

/// One server workspace registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkspaceSection {
    /// Workspace id used in procedure calls.
    pub id: String,
    /// Absolute root path.
    pub root: PathBuf,
    /// Display name.
    pub name: Option<String>,
    /// Reject writes when set.
    pub read_only: bool,
    /// Path allow globs. Empty → allow all inside the root.
    pub allow: Vec<String>,
    /// Path block globs.
    pub block: Vec<String>,
    /// File extension allow-list (no leading dot). Empty → all.
    pub allowed_extensions: Vec<String>,
    /// File extension block-list.
    pub blocked_extensions: Vec<String>,
    /// Maximum file size for reads and writes, bytes.
    pub max_file_size: u64,
    /// Follow symlinks during containment checks.
    pub follow_symlinks: bool,
    /// Recursive listing bound; results past it are truncated.
    pub max_entries: usize,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            root: PathBuf::new(),
            name: None,
            read_only: false,
            allow: Vec::new(),
            block: Vec::new(),
            allowed_extensions: Vec::new(),
            blocked_extensions: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
            follow_symlinks: false,
            max_entries: 10_000,
        }
    }
}
