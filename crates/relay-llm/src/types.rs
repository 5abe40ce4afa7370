//! Request and response types for text generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions.
    System,
    /// Caller content.
    User,
    /// Model output.
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// How web search should be performed, when requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WebSearchPreference {
    /// Out-of-band DuckDuckGo search.
    Duckduckgo,
    /// Route through registered MCP tools.
    Mcp,
    /// Enable the provider's native browsing.
    AiWebSearch,
    /// Disable search.
    #[default]
    Never,
}

/// Web-search request metadata. The pipeline passes this opaquely; only
/// adapters whose provider supports native browsing act on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSearchOptions {
    /// Search mechanism.
    pub preference: WebSearchPreference,
    /// Domains search results may come from.
    pub allowed_domains: Vec<String>,
    /// Domains filtered out of search results.
    pub blocked_domains: Vec<String>,
}

/// One text-generation request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model id.
    pub model: String,
    /// System prompt (may be empty).
    pub system: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Output token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Web-search metadata, passed through opaquely.
    pub web_search: Option<WebSearchOptions>,
    /// Per-call HTTP timeout derived from the request deadline.
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    /// A minimal request used by key validation.
    #[must_use]
    pub fn probe(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: String::new(),
            messages: vec![ChatMessage::user("ping")],
            max_tokens: 1,
            temperature: None,
            web_search: None,
            timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    /// Natural end of turn.
    Stop,
    /// Output token cap reached.
    Length,
    /// Provider content filter.
    ContentFilter,
    /// Anything else the provider reported.
    Other,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Generated text.
    pub text: String,
    /// Input tokens, as reported or estimated.
    pub input_tokens: u64,
    /// Output tokens, as reported or estimated.
    pub output_tokens: u64,
    /// True when the provider did not report counts and they were
    /// estimated locally; settlement surfaces this flag.
    pub counts_estimated: bool,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Provider-side request id, for support escalation.
    pub provider_request_id: Option<String>,
}
