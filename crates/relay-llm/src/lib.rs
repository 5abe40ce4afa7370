//! Relay LLM - uniform text-generation capability over concrete provider
//! HTTP APIs.
//!
//! One trait, [`TextProvider`], and three wire implementations:
//! Anthropic's messages API, the OpenAI chat-completions wire (which also
//! serves OpenRouter, Hugging Face, and user-declared OpenAI-compatible
//! endpoints via `base_url`), and Google's `generateContent`.
//!
//! Adapters are selected by a provider's `type` alias, never by its id, so
//! a declared provider like `deepseek` can reuse the OpenAI adapter.
//! Credentials arrive as [`SecretString`]s scoped to the call and are
//! marked sensitive on the wire; transport failures classify into
//! [`UpstreamErrorKind`].
//!
//! [`SecretString`]: relay_core::SecretString
//! [`UpstreamErrorKind`]: relay_core::UpstreamErrorKind

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod anthropic;
pub mod error;
pub mod google;
pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod tokens;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use error::{ProviderError, ProviderResult};
pub use google::GoogleProvider;
pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ConcurrencyLimited, TextProvider, build_adapter};
pub use tokens::estimate_tokens;
pub use types::{
    ChatMessage, ChatRole, FinishReason, GenerateRequest, Generated, WebSearchOptions,
    WebSearchPreference,
};
