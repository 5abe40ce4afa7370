//! Anthropic messages-API adapter.

use async_trait::async_trait;
use relay_core::{SecretString, UpstreamErrorKind};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::TextProvider;
use crate::tokens::estimate_tokens;
use crate::types::{ChatRole, FinishReason, GenerateRequest, Generated, WebSearchPreference};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic adapter.
pub struct AnthropicProvider {
    client: Client,
    base_url: Option<String>,
}

impl AnthropicProvider {
    /// Create an adapter; `base_url` overrides the public endpoint.
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn build_request(request: &GenerateRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        ChatRole::Assistant => "assistant",
                        ChatRole::User | ChatRole::System => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if !request.system.is_empty() {
            body["system"] = Value::String(request.system.clone());
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(search) = &request.web_search
            && search.preference == WebSearchPreference::AiWebSearch
        {
            let mut tool = serde_json::json!({
                "type": "web_search_20250305",
                "name": "web_search",
            });
            if !search.allowed_domains.is_empty() {
                tool["allowed_domains"] = serde_json::json!(search.allowed_domains);
            }
            if !search.blocked_domains.is_empty() {
                tool["blocked_domains"] = serde_json::json!(search.blocked_domains);
            }
            body["tools"] = Value::Array(vec![tool]);
        }
        body
    }

    fn parse_response(response: ApiResponse) -> Generated {
        let text: String = response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = match response.stop_reason.as_deref() {
            Some("end_turn" | "stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        let (input_tokens, output_tokens, counts_estimated) = match response.usage {
            Some(usage) => (usage.input_tokens, usage.output_tokens, false),
            None => (0, estimate_tokens(&text), true),
        };

        Generated {
            text,
            input_tokens,
            output_tokens,
            counts_estimated,
            finish_reason,
            provider_request_id: response.id,
        }
    }
}

#[async_trait]
impl TextProvider for AnthropicProvider {
    fn kind(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        let url = self.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
        let body = Self::build_request(request);

        debug!(model = %request.model, "Sending Anthropic request");

        let mut api_key = reqwest::header::HeaderValue::try_from(credential.expose())
            .map_err(|_| {
                ProviderError::new(UpstreamErrorKind::Auth, "API key contains invalid characters")
            })?;
        api_key.set_sensitive(true);

        let mut builder = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
        Ok(Self::parse_response(api_response))
    }
}

/// Parse a `retry-after` header if present and sane.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: Option<String>,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            system: "be brief".to_string(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 128,
            temperature: Some(0.2),
            web_search: None,
            timeout: None,
        }
    }

    #[test]
    fn test_build_request() {
        let body = AnthropicProvider::build_request(&request());
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_native_search_adds_tool_with_domain_filters() {
        let mut req = request();
        req.web_search = Some(crate::types::WebSearchOptions {
            preference: WebSearchPreference::AiWebSearch,
            allowed_domains: vec!["docs.rs".to_string()],
            blocked_domains: vec![],
        });
        let body = AnthropicProvider::build_request(&req);
        assert_eq!(body["tools"][0]["name"], "web_search");
        assert_eq!(body["tools"][0]["allowed_domains"][0], "docs.rs");
    }

    #[test]
    fn test_parse_response_with_usage() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_123",
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 2},
        }))
        .unwrap();
        let generated = AnthropicProvider::parse_response(response);
        assert_eq!(generated.text, "hello");
        assert_eq!(generated.input_tokens, 5);
        assert_eq!(generated.output_tokens, 2);
        assert!(!generated.counts_estimated);
        assert_eq!(generated.finish_reason, FinishReason::Stop);
        assert_eq!(generated.provider_request_id.as_deref(), Some("msg_123"));
    }

    #[test]
    fn test_parse_response_without_usage_estimates() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "four byte"}],
            "stop_reason": "max_tokens",
        }))
        .unwrap();
        let generated = AnthropicProvider::parse_response(response);
        assert!(generated.counts_estimated);
        assert_eq!(generated.output_tokens, estimate_tokens("four byte"));
        assert_eq!(generated.finish_reason, FinishReason::Length);
    }
}
