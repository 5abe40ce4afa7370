//! Scriptable mock adapter for pipeline and dispatch tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::{SecretString, UpstreamErrorKind};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::TextProvider;
use crate::types::{FinishReason, GenerateRequest, Generated};

/// What the mock should do for one call.
#[derive(Debug)]
pub enum MockBehavior {
    /// Return a canned response.
    Respond(Generated),
    /// Fail with a classified error.
    Fail(UpstreamErrorKind),
    /// Never resolve (cancellation and deadline tests).
    Hang,
}

/// A recorded call, with the credential reduced to its fingerprint.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Requested model.
    pub model: String,
    /// Fingerprint of the credential used (never the credential).
    pub credential_fingerprint: String,
    /// `max_tokens` the request carried.
    pub max_tokens: u32,
}

/// Mock text provider.
///
/// With an empty script every call succeeds with `"hello"` and token
/// counts 5/2. Queue behaviours with [`MockProvider::enqueue`] to script
/// failures, specific responses, or hangs.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockBehavior>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockProvider {
    /// Create a mock with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next behaviour.
    pub fn enqueue(&self, behavior: MockBehavior) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(behavior);
    }

    /// Queue a plain text response with explicit token counts.
    pub fn enqueue_text(&self, text: &str, input_tokens: u64, output_tokens: u64) {
        self.enqueue(MockBehavior::Respond(Generated {
            text: text.to_string(),
            input_tokens,
            output_tokens,
            counts_estimated: false,
            finish_reason: FinishReason::Stop,
            provider_request_id: Some("mock-req".to_string()),
        }));
    }

    /// Calls observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("mock calls lock poisoned").clone()
    }

    fn default_response() -> Generated {
        Generated {
            text: "hello".to_string(),
            input_tokens: 5,
            output_tokens: 2,
            counts_estimated: false,
            finish_reason: FinishReason::Stop,
            provider_request_id: Some("mock-req".to_string()),
        }
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl TextProvider for MockProvider {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        self.calls
            .lock()
            .expect("mock calls lock poisoned")
            .push(RecordedCall {
                model: request.model.clone(),
                credential_fingerprint: credential.fingerprint(),
                max_tokens: request.max_tokens,
            });

        let behavior = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front();
        match behavior {
            None => Ok(Self::default_response()),
            Some(MockBehavior::Respond(generated)) => Ok(generated),
            Some(MockBehavior::Fail(kind)) => {
                Err(ProviderError::new(kind, "scripted failure"))
            },
            Some(MockBehavior::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_response_and_recording() {
        let mock = MockProvider::new();
        let key = SecretString::new("sk-test");
        let generated = mock
            .generate(&key, &GenerateRequest::probe("mock-model"))
            .await
            .unwrap();
        assert_eq!(generated.text, "hello");
        assert_eq!(generated.input_tokens, 5);
        assert_eq!(generated.output_tokens, 2);

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "mock-model");
        assert_eq!(calls[0].credential_fingerprint, key.fingerprint());
        // The record never holds the raw key.
        assert_ne!(calls[0].credential_fingerprint, "sk-test");
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mock = MockProvider::new();
        mock.enqueue(MockBehavior::Fail(UpstreamErrorKind::RateLimited));
        let err = mock
            .generate(&SecretString::new("k"), &GenerateRequest::probe("m"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::RateLimited);

        // Script exhausted; back to default.
        assert!(
            mock.generate(&SecretString::new("k"), &GenerateRequest::probe("m"))
                .await
                .is_ok()
        );
    }
}
