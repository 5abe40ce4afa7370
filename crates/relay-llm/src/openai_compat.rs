//! OpenAI chat-completions adapter.
//!
//! One wire, many providers: OpenAI itself, OpenRouter, Hugging Face's
//! router, and any user-declared OpenAI-compatible endpoint - all selected
//! by `base_url`.

use async_trait::async_trait;
use relay_core::{SecretString, UpstreamErrorKind};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::anthropic::retry_after_secs;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::TextProvider;
use crate::tokens::estimate_tokens;
use crate::types::{ChatRole, FinishReason, GenerateRequest, Generated};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible adapter.
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create an adapter; `base_url` selects the endpoint (trailing slash
    /// tolerated), defaulting to the OpenAI API.
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn build_request(request: &GenerateRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": request.system,
            }));
        }
        for message in &request.messages {
            messages.push(serde_json::json!({
                "role": match message.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                "content": message.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    fn parse_response(response: ApiResponse) -> ProviderResult<Generated> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new(UpstreamErrorKind::ServerError, "response carried no choices")
        })?;
        let text = choice.message.content.unwrap_or_default();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        let (input_tokens, output_tokens, counts_estimated) = match response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens, false),
            None => (0, estimate_tokens(&text), true),
        };

        Ok(Generated {
            text,
            input_tokens,
            output_tokens,
            counts_estimated,
            finish_reason,
            provider_request_id: response.id,
        })
    }
}

#[async_trait]
impl TextProvider for OpenAiCompatProvider {
    fn kind(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        let url = self.endpoint();
        let body = Self::build_request(request);

        debug!(model = %request.model, "Sending OpenAI-compatible request");

        let mut bearer =
            reqwest::header::HeaderValue::try_from(format!("Bearer {}", credential.expose()))
                .map_err(|_| {
                    ProviderError::new(
                        UpstreamErrorKind::Auth,
                        "API key contains invalid characters",
                    )
                })?;
        bearer.set_sensitive(true);

        let mut builder = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body, retry_after));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::new(UpstreamErrorKind::ServerError, format!("invalid response: {e}"))
        })?;
        Self::parse_response(api_response)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
