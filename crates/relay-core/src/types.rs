//! User identity, tier, and preference types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable user identity.
///
/// Opaque to the core; deployments typically derive it from the
/// authenticated email. Ordering and hashing follow the inner string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Unauthenticated caller.
    Anonymous,
    /// Authenticated, no subscription.
    #[default]
    Free,
    /// Paying subscriber with a monthly token pool.
    Subscriber,
}

/// The balance pool a charge is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalancePool {
    /// Monthly subscription allowance.
    Subscription,
    /// Purchased token balance.
    Prepaid,
}

/// Per-user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    /// Order in which balance pools are consumed at settlement.
    pub consumption_order: Vec<BalancePool>,
    /// Whether the user has opted in to BYOK credential use.
    pub byok_enabled: bool,
    /// Provider used when a request names none.
    pub default_provider: Option<String>,
    /// Notify when the remaining balance drops below this many tokens.
    pub notify_below_tokens: Option<u64>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            consumption_order: vec![BalancePool::Subscription, BalancePool::Prepaid],
            byok_enabled: true,
            default_provider: None,
            notify_below_tokens: None,
        }
    }
}

/// A user record as the gateway sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable identity.
    pub id: UserId,
    /// Contact / login email.
    pub email: String,
    /// Subscription tier.
    pub tier: SubscriptionTier,
    /// Preferences.
    pub preferences: UserPreferences,
    /// First-seen timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a fresh profile for a first-time caller.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            tier: SubscriptionTier::Free,
            preferences: UserPreferences::default(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        let id = UserId::new("alice@example.com");
        assert_eq!(id.to_string(), "alice@example.com");
        assert_eq!(id.as_str(), "alice@example.com");
    }

    #[test]
    fn test_default_preferences_consume_subscription_first() {
        let prefs = UserPreferences::default();
        assert_eq!(
            prefs.consumption_order,
            vec![BalancePool::Subscription, BalancePool::Prepaid]
        );
        assert!(prefs.byok_enabled);
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&SubscriptionTier::Subscriber).unwrap();
        assert_eq!(json, "\"subscriber\"");
    }
}
