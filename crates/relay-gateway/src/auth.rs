//! Bearer-token authentication.
//!
//! OAuth and token issuance live outside the core; the gateway verifies
//! bearer tokens against the configured table. Lookup is constant-time
//! over every entry so response timing does not reveal which tokens
//! exist.

use relay_core::UserId;
use subtle::ConstantTimeEq;

/// The identity a token resolved to.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Authenticated user, if the token matched.
    pub user: Option<UserId>,
    /// Whether the token grants operator procedures.
    pub is_admin: bool,
}

/// Token verifier.
pub struct Authenticator {
    /// `(token, user)` pairs.
    tokens: Vec<(String, UserId)>,
    /// Operator tokens.
    admin_tokens: Vec<String>,
}

impl Authenticator {
    /// Build from the `[auth]` config section.
    #[must_use]
    pub fn new(tokens: &std::collections::HashMap<String, String>, admin_tokens: &[String]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, email)| (token.clone(), UserId::new(email.clone())))
                .collect(),
            admin_tokens: admin_tokens.to_vec(),
        }
    }

    /// Resolve a presented bearer token. Every stored token is compared
    /// regardless of early matches.
    #[must_use]
    pub fn identify(&self, presented: Option<&str>) -> Identity {
        let Some(presented) = presented else {
            return Identity::default();
        };

        let mut user = None;
        for (token, owner) in &self.tokens {
            if constant_time_eq(token, presented) {
                user = Some(owner.clone());
            }
        }

        let mut is_admin = false;
        for token in &self.admin_tokens {
            if constant_time_eq(token, presented) {
                is_admin = true;
            }
        }

        Identity { user, is_admin }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("tokens", &self.tokens.len())
            .field("admin_tokens", &self.admin_tokens.len())
            .finish()
    }
}

/// Length-safe constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        // Burn a comparison anyway so length mismatches cost the same.
        let _ = a.ct_eq(a);
        return false;
    }
    a.ct_eq(b).into()
}
