//! Provider error classification.

use relay_core::UpstreamErrorKind;
use thiserror::Error;

/// A classified provider adapter failure.
#[derive(Debug, Error)]
#[error("{} error from provider: {message}", kind.as_str())]
pub struct ProviderError {
    /// Failure classification.
    pub kind: UpstreamErrorKind,
    /// Provider-reported detail. Never contains credential material.
    pub message: String,
    /// Upstream-suggested retry delay, when reported.
    pub retry_after_secs: Option<u64>,
}

impl ProviderError {
    /// Build an error of a given kind.
    #[must_use]
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Classify an HTTP status + body into an error.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => UpstreamErrorKind::Auth,
            429 => UpstreamErrorKind::RateLimited,
            400..=499 => UpstreamErrorKind::BadRequest,
            _ => UpstreamErrorKind::ServerError,
        };
        // Bodies can be huge; keep enough to diagnose.
        let mut message = format!("status {status}: ");
        message.extend(body.chars().take(512));
        Self {
            kind,
            message,
            retry_after_secs: retry_after,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if err.is_status() {
            return Self::from_status(
                err.status().unwrap_or(reqwest::StatusCode::BAD_GATEWAY),
                "",
                None,
            );
        } else {
            UpstreamErrorKind::ServerError
        };
        // reqwest errors may embed the URL; keep only the error class and
        // top-level description.
        Self::new(kind, err.without_url().to_string())
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let auth = ProviderError::from_status(reqwest::StatusCode::UNAUTHORIZED, "bad key", None);
        assert_eq!(auth.kind, UpstreamErrorKind::Auth);

        let limited =
            ProviderError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "", Some(30));
        assert_eq!(limited.kind, UpstreamErrorKind::RateLimited);
        assert_eq!(limited.retry_after_secs, Some(30));

        let bad = ProviderError::from_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "", None);
        assert_eq!(bad.kind, UpstreamErrorKind::BadRequest);

        let server = ProviderError::from_status(reqwest::StatusCode::BAD_GATEWAY, "", None);
        assert_eq!(server.kind, UpstreamErrorKind::ServerError);
    }

    #[test]
    fn test_body_is_truncated() {
        let long = "x".repeat(10_000);
        let err = ProviderError::from_status(reqwest::StatusCode::BAD_REQUEST, &long, None);
        assert!(err.message.len() < 600);
    }
}
