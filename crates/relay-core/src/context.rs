//! Per-request caller context.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::secret::SecretString;
use crate::types::UserId;

/// Who is making the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No identity presented.
    Anonymous,
    /// Authenticated user.
    User(UserId),
}

impl Caller {
    /// Whether an identity was presented.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// The user id, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}

/// Context threaded through a single procedure call.
///
/// Carries identity, the BYOK unlock secret (if the transport supplied
/// one), the cancellation signal, and the request deadline. Built once at
/// the dispatch boundary and passed by reference through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for logs and error reports.
    pub request_id: Uuid,
    /// Caller identity.
    pub caller: Caller,
    /// Whether the presented credential grants operator procedures.
    pub is_admin: bool,
    /// Unlock secret for BYOK material, scoped to this call.
    pub byok_unlock: Option<SecretString>,
    /// Cancellation signal; trips when the client disconnects or the
    /// deadline passes.
    pub cancel: CancellationToken,
    /// Absolute deadline for the request.
    pub deadline: Option<DateTime<Utc>>,
}

impl RequestContext {
    /// Context for an anonymous call.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller: Caller::Anonymous,
            is_admin: false,
            byok_unlock: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context for an authenticated call.
    #[must_use]
    pub fn for_user(user: UserId) -> Self {
        Self {
            caller: Caller::User(user),
            ..Self::anonymous()
        }
    }

    /// Attach a BYOK unlock secret.
    #[must_use]
    pub fn with_unlock(mut self, secret: SecretString) -> Self {
        self.byok_unlock = Some(secret);
        self
    }

    /// The authenticated user id, or an `Unauthenticated` error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unauthenticated`] for anonymous callers.
    pub fn require_user(&self) -> crate::GatewayResult<&UserId> {
        self.caller
            .user_id()
            .ok_or_else(|| crate::GatewayError::Unauthenticated("authentication required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_user() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.caller.is_authenticated());
        assert!(ctx.require_user().is_err());
    }

    #[test]
    fn test_for_user() {
        let ctx = RequestContext::for_user(UserId::new("u1"));
        assert_eq!(ctx.require_user().unwrap().as_str(), "u1");
        assert!(!ctx.is_admin);
    }
}
