//! The text-generation capability trait and adapter construction.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{SecretString, UpstreamErrorKind};
use tokio::sync::Semaphore;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{GenerateRequest, Generated};

/// Text-generation capability over one provider wire.
///
/// Implementations never log, store, or echo the credential; it reaches
/// the HTTP layer as a sensitive header and nothing else.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// The adapter kind alias this implementation serves.
    fn kind(&self) -> &'static str;

    /// Generate text.
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated>;

    /// Check that a credential is usable with a minimal upstream call.
    async fn validate_key(&self, credential: &SecretString, model: &str) -> ProviderResult<()> {
        self.generate(credential, &GenerateRequest::probe(model))
            .await
            .map(|_| ())
    }
}

/// Blanket impl so `Arc<dyn TextProvider>` satisfies `P: TextProvider`.
#[async_trait]
impl TextProvider for Arc<dyn TextProvider> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        (**self).generate(credential, request).await
    }

    async fn validate_key(&self, credential: &SecretString, model: &str) -> ProviderResult<()> {
        (**self).validate_key(credential, model).await
    }
}

/// Default concurrent-request cap per provider.
const DEFAULT_CONCURRENCY: usize = 32;

/// Caps in-flight requests to one upstream provider.
///
/// The local rate limiter sheds load well before this point; the cap is
/// the last guard against hammering an upstream into 429s.
pub struct ConcurrencyLimited {
    inner: Arc<dyn TextProvider>,
    permits: Semaphore,
}

impl ConcurrencyLimited {
    /// Wrap an adapter with the default cap.
    #[must_use]
    pub fn new(inner: Arc<dyn TextProvider>) -> Self {
        Self::with_cap(inner, DEFAULT_CONCURRENCY)
    }

    /// Wrap an adapter with an explicit cap.
    #[must_use]
    pub fn with_cap(inner: Arc<dyn TextProvider>, cap: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(cap.max(1)),
        }
    }
}

#[async_trait]
impl TextProvider for ConcurrencyLimited {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerateRequest,
    ) -> ProviderResult<Generated> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            ProviderError::new(UpstreamErrorKind::Cancelled, "provider shutting down")
        })?;
        self.inner.generate(credential, request).await
    }

    async fn validate_key(&self, credential: &SecretString, model: &str) -> ProviderResult<()> {
        self.inner.validate_key(credential, model).await
    }
}

/// Construct an adapter by kind alias.
///
/// `base_url` overrides the wire's default endpoint; this is how
/// OpenRouter, Hugging Face, and user-declared providers ride the OpenAI
/// wire. Returns `None` for unknown aliases.
#[must_use]
pub fn build_adapter(kind: &str, base_url: Option<String>) -> Option<Arc<dyn TextProvider>> {
    let adapter: Arc<dyn TextProvider> = match kind {
        "anthropic" => Arc::new(crate::anthropic::AnthropicProvider::new(base_url)),
        "openai" => Arc::new(crate::openai_compat::OpenAiCompatProvider::new(base_url)),
        "google" => Arc::new(crate::google::GoogleProvider::new(base_url)),
        "mock" => Arc::new(crate::mock::MockProvider::default()),
        _ => return None,
    };
    Some(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adapter_by_alias() {
        assert_eq!(build_adapter("anthropic", None).unwrap().kind(), "anthropic");
        assert_eq!(build_adapter("openai", None).unwrap().kind(), "openai");
        assert_eq!(build_adapter("google", None).unwrap().kind(), "google");
        assert!(build_adapter("grpc", None).is_none());
    }

    #[tokio::test]
    async fn test_concurrency_cap_serializes_excess() {
        let inner = Arc::new(crate::mock::MockProvider::default());
        let limited = Arc::new(ConcurrencyLimited::with_cap(inner, 2));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limited = Arc::clone(&limited);
            tasks.push(tokio::spawn(async move {
                limited
                    .generate(
                        &SecretString::new("k"),
                        &GenerateRequest::probe("mock-model"),
                    )
                    .await
                    .is_ok()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
    }
}
