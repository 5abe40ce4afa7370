//! Google Gemini `generateContent` adapter.

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

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini adapter.
pub struct GoogleProvider {
    client: Client,
    base_url: Option<String>,
}

impl GoogleProvider {
    /// Create an adapter; `base_url` overrides the public endpoint.
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(GOOGLE_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1beta/models/{model}:generateContent")
    }

    fn build_request(request: &GenerateRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        ChatRole::Assistant => "model",
                        ChatRole::User | ChatRole::System => "user",
                    },
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let mut generation_config = serde_json::json!({
            "maxOutputTokens": request.max_tokens,
        });
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = serde_json::json!(temperature);
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !request.system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": request.system}],
            });
        }
        body
    }

    fn parse_response(response: ApiResponse) -> ProviderResult<Generated> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::new(UpstreamErrorKind::ServerError, "response carried no candidates")
        })?;
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY" | "PROHIBITED_CONTENT") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        let (input_tokens, output_tokens, counts_estimated) = match response.usage_metadata {
            Some(usage) => (usage.prompt_token_count, usage.candidates_token_count, false),
            None => (0, estimate_tokens(&text), true),
        };

        Ok(Generated {
            text,
            input_tokens,
            output_tokens,
            counts_estimated,
            finish_reason,
            provider_request_id: response.response_id,
        })
    }
}

#[async_trait]
impl TextProvider for GoogleProvider {
    fn kind(&self) -> &'static str {
        "google"
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        let url = self.endpoint(&request.model);
        let body = Self::build_request(request);

        debug!(model = %request.model, "Sending Gemini request");

        // Key goes in a header, not the query string, so it cannot leak
        // through request logs.
        let mut api_key = reqwest::header::HeaderValue::try_from(credential.expose())
            .map_err(|_| {
                ProviderError::new(UpstreamErrorKind::Auth, "API key contains invalid characters")
            })?;
        api_key.set_sensitive(true);

        let mut builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
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
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn test_endpoint_embeds_model() {
        let provider = GoogleProvider::new(None);
        assert_eq!(
            provider.endpoint("gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_build_request_roles_and_system() {
        let request = GenerateRequest {
            model: "gemini-2.0-flash".to_string(),
            system: "be brief".to_string(),
            messages: vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
            ],
            max_tokens: 64,
            temperature: Some(0.5),
            web_search: None,
            timeout: None,
        };
        let body = GoogleProvider::build_request(&request);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn test_parse_response() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "responseId": "resp-1",
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hello"}]},
                "finishReason": "STOP",
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2},
        }))
        .unwrap();
        let generated = GoogleProvider::parse_response(response).unwrap();
        assert_eq!(generated.text, "hello");
        assert_eq!(generated.input_tokens, 4);
        assert_eq!(generated.output_tokens, 2);
        assert_eq!(generated.finish_reason, FinishReason::Stop);
    }
}
