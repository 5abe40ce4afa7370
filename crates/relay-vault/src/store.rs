//! The vault store: scoped unlock over the BYOK table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::{SecretString, UserId};
use relay_storage::{ByokRecord, ByokStore};
use tracing::debug;

use crate::cipher;
use crate::error::{VaultError, VaultResult};

/// What `auth.getUserKey` may see: presence and timestamps, never the key.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    /// Whether an entry exists.
    pub present: bool,
    /// When the entry was first stored.
    pub created_at: Option<DateTime<Utc>>,
    /// When the key was last rotated.
    pub rotated_at: Option<DateTime<Utc>>,
}

impl KeyStatus {
    fn absent() -> Self {
        Self {
            present: false,
            created_at: None,
            rotated_at: None,
        }
    }
}

/// BYOK secret store.
///
/// Policy ("may this provider take BYOK at all?") is the caller's check;
/// the vault only ever sees admitted requests.
#[derive(Clone)]
pub struct SecretVault {
    byok: Arc<dyn ByokStore>,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

/// AAD binding a record to its `(user, provider)` row.
fn binding(user: &UserId, provider: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(user.as_str().len() + provider.len() + 1);
    aad.extend_from_slice(user.as_str().as_bytes());
    aad.push(0);
    aad.extend_from_slice(provider.as_bytes());
    aad
}

impl SecretVault {
    /// Create a vault over a BYOK table.
    #[must_use]
    pub fn new(byok: Arc<dyn ByokStore>) -> Self {
        Self { byok }
    }

    /// Store (upsert) a key. A fresh entry gets `created_at = now`; an
    /// overwrite keeps the original `created_at` and stamps `rotated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Kdf`], [`VaultError::Encrypt`], or a storage
    /// error.
    pub async fn store(
        &self,
        user: &UserId,
        provider: &str,
        api_key: &SecretString,
        unlock_secret: &SecretString,
    ) -> VaultResult<()> {
        let existing = self.byok.get(user, provider).await?;
        let aad = binding(user, provider);
        let (ciphertext, nonce, kdf) =
            cipher::seal(api_key.expose().as_bytes(), &aad, unlock_secret.expose())?;

        let now = Utc::now();
        let record = ByokRecord {
            user: user.clone(),
            provider: provider.to_string(),
            ciphertext,
            nonce,
            kdf,
            created_at: existing.as_ref().map_or(now, |r| r.created_at),
            rotated_at: existing.is_some().then_some(now),
        };
        self.byok.upsert(record).await?;
        debug!(user = %user, provider = %provider, "Stored BYOK entry");
        Ok(())
    }

    /// Atomic key replacement. Same write path as [`SecretVault::store`];
    /// kept as a distinct operation because rotation requires an existing
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptFailed`] when no entry exists, or any
    /// [`SecretVault::store`] error.
    pub async fn rotate(
        &self,
        user: &UserId,
        provider: &str,
        new_api_key: &SecretString,
        unlock_secret: &SecretString,
    ) -> VaultResult<()> {
        if self.byok.get(user, provider).await?.is_none() {
            cipher::decoy_derivation(unlock_secret.expose());
            return Err(VaultError::DecryptFailed);
        }
        self.store(user, provider, new_api_key, unlock_secret).await
    }

    /// Presence and timestamps. Never the key.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn status(&self, user: &UserId, provider: &str) -> VaultResult<KeyStatus> {
        Ok(match self.byok.get(user, provider).await? {
            Some(record) => KeyStatus {
                present: true,
                created_at: Some(record.created_at),
                rotated_at: record.rotated_at,
            },
            None => KeyStatus::absent(),
        })
    }

    /// Decrypt and return the key, scoped to the caller. The result zeroes
    /// itself on drop; callers must not persist it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptFailed`] for a wrong secret *or* a
    /// missing entry.
    pub async fn unlock(
        &self,
        user: &UserId,
        provider: &str,
        unlock_secret: &SecretString,
    ) -> VaultResult<SecretString> {
        let Some(record) = self.byok.get(user, provider).await? else {
            cipher::decoy_derivation(unlock_secret.expose());
            return Err(VaultError::DecryptFailed);
        };

        let aad = binding(user, provider);
        let plaintext = cipher::open(
            &record.ciphertext,
            &record.nonce,
            &record.kdf,
            &aad,
            unlock_secret.expose(),
        )?;
        let api_key = String::from_utf8(plaintext.to_vec())
            .map_err(|_| VaultError::DecryptFailed)?;
        Ok(SecretString::new(api_key))
    }

    /// Delete an entry. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn delete(&self, user: &UserId, provider: &str) -> VaultResult<()> {
        let removed = self.byok.remove(user, provider).await?;
        if removed {
            debug!(user = %user, provider = %provider, "Deleted BYOK entry");
        }
        Ok(())
    }

    /// Providers the user has keys for.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn providers_for(&self, user: &UserId) -> VaultResult<Vec<String>> {
        Ok(self.byok.providers_for(user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::MemoryStore;

    fn vault() -> SecretVault {
        SecretVault::new(Arc::new(MemoryStore::new()))
    }

    fn secret(s: &str) -> SecretString {
        SecretString::new(s)
    }

    #[tokio::test]
    async fn test_store_then_unlock_round_trip() {
        let vault = vault();
        let user = UserId::new("u1");
        vault
            .store(&user, "anthropic", &secret("sk-ant-1"), &secret("pw"))
            .await
            .unwrap();

        let key = vault.unlock(&user, "anthropic", &secret("pw")).await.unwrap();
        assert_eq!(key.expose(), "sk-ant-1");

        let status = vault.status(&user, "anthropic").await.unwrap();
        assert!(status.present);
        assert!(status.created_at.is_some());
        assert!(status.rotated_at.is_none());
    }

    #[tokio::test]
    async fn test_wrong_secret_and_missing_entry_are_indistinguishable() {
        let vault = vault();
        let user = UserId::new("u1");
        vault
            .store(&user, "anthropic", &secret("sk"), &secret("pw"))
            .await
            .unwrap();

        let wrong = vault
            .unlock(&user, "anthropic", &secret("oops"))
            .await
            .unwrap_err();
        let missing = vault.unlock(&user, "openai", &secret("pw")).await.unwrap_err();

        assert_eq!(wrong.to_string(), missing.to_string());
        assert!(matches!(wrong, VaultError::DecryptFailed));
        assert!(matches!(missing, VaultError::DecryptFailed));
    }

    #[tokio::test]
    async fn test_rotate_replaces_and_old_ciphertext_unreadable() {
        let vault = vault();
        let user = UserId::new("u1");
        vault
            .store(&user, "anthropic", &secret("old"), &secret("pw"))
            .await
            .unwrap();
        vault
            .rotate(&user, "anthropic", &secret("new"), &secret("pw"))
            .await
            .unwrap();

        let key = vault.unlock(&user, "anthropic", &secret("pw")).await.unwrap();
        assert_eq!(key.expose(), "new");

        let status = vault.status(&user, "anthropic").await.unwrap();
        assert!(status.rotated_at.is_some());
    }

    #[tokio::test]
    async fn test_rotate_without_entry_fails() {
        let vault = vault();
        let err = vault
            .rotate(&UserId::new("u1"), "anthropic", &secret("k"), &secret("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailed));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let vault = vault();
        let user = UserId::new("u1");
        vault
            .store(&user, "anthropic", &secret("k"), &secret("pw"))
            .await
            .unwrap();

        vault.delete(&user, "anthropic").await.unwrap();
        assert!(!vault.status(&user, "anthropic").await.unwrap().present);
        // Twice is not an error.
        vault.delete(&user, "anthropic").await.unwrap();
    }

    #[tokio::test]
    async fn test_per_user_isolation() {
        let vault = vault();
        vault
            .store(&UserId::new("u1"), "anthropic", &secret("k1"), &secret("pw"))
            .await
            .unwrap();

        let err = vault
            .unlock(&UserId::new("u2"), "anthropic", &secret("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailed));
        assert!(
            vault
                .providers_for(&UserId::new("u2"))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
