//! Builtin provider table.
//!
//! Single source of truth for which provider ids ship with the gateway and
//! what their defaults are. Auto-detection (`providers` absent from config)
//! walks this table and enables every provider whose environment variable
//! is set.

/// Metadata for one builtin provider.
#[derive(Debug, Clone)]
pub struct BuiltinProvider {
    /// Provider id used in requests and config (e.g. `"anthropic"`).
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    /// Environment variable holding the server API key.
    pub env_key: &'static str,
    /// Default endpoint. `None` means the adapter's own default.
    pub default_base_url: Option<&'static str>,
    /// Adapter kind alias selecting the wire implementation.
    pub kind: &'static str,
    /// Model used when neither request nor config names one.
    pub default_model: &'static str,
}

/// Complete table of builtin providers.
pub static BUILTIN_PROVIDERS: &[BuiltinProvider] = &[
    BuiltinProvider {
        id: "anthropic",
        name: "Anthropic",
        env_key: "ANTHROPIC_API_KEY",
        default_base_url: None,
        kind: "anthropic",
        default_model: "claude-sonnet-4-20250514",
    },
    BuiltinProvider {
        id: "openai",
        name: "OpenAI",
        env_key: "OPENAI_API_KEY",
        default_base_url: None,
        kind: "openai",
        default_model: "gpt-4o-mini",
    },
    BuiltinProvider {
        id: "google",
        name: "Google Gemini",
        env_key: "GEMINI_API_KEY",
        default_base_url: None,
        kind: "google",
        default_model: "gemini-2.0-flash",
    },
    BuiltinProvider {
        id: "openrouter",
        name: "OpenRouter",
        env_key: "OPENROUTER_API_KEY",
        default_base_url: Some("https://openrouter.ai/api/v1"),
        kind: "openai",
        default_model: "openrouter/auto",
    },
    BuiltinProvider {
        id: "huggingface",
        name: "Hugging Face",
        env_key: "HF_TOKEN",
        default_base_url: Some("https://router.huggingface.co/v1"),
        kind: "openai",
        default_model: "meta-llama/Llama-3.3-70B-Instruct",
    },
];

/// Look up a builtin provider by id.
#[must_use]
pub fn builtin_provider(id: &str) -> Option<&'static BuiltinProvider> {
    BUILTIN_PROVIDERS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(builtin_provider("anthropic").unwrap().kind, "anthropic");
        assert!(builtin_provider("nope").is_none());
    }

    #[test]
    fn test_openai_compatible_providers_reuse_openai_kind() {
        assert_eq!(builtin_provider("openrouter").unwrap().kind, "openai");
        assert_eq!(builtin_provider("huggingface").unwrap().kind, "openai");
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<&str> = BUILTIN_PROVIDERS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN_PROVIDERS.len());
    }
}
