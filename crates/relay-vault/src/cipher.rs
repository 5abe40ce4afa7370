//! AEAD sealing with an unlock-secret-derived key.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;
use relay_storage::KdfParams;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Derived key length, bytes.
const KEY_LEN: usize = 32;
/// XChaCha20 nonce length, bytes.
pub(crate) const NONCE_LEN: usize = 24;
/// Per-record salt length, bytes.
const SALT_LEN: usize = 16;

/// Default Argon2id memory cost, KiB.
const DEFAULT_MEMORY_KIB: u32 = 19_456;
/// Default Argon2id iterations.
const DEFAULT_ITERATIONS: u32 = 2;
/// Default Argon2id lanes.
const DEFAULT_PARALLELISM: u32 = 1;

/// Fresh KDF parameters with a random salt.
#[must_use]
pub fn fresh_kdf_params() -> KdfParams {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    KdfParams {
        salt,
        memory_kib: DEFAULT_MEMORY_KIB,
        iterations: DEFAULT_ITERATIONS,
        parallelism: DEFAULT_PARALLELISM,
    }
}

/// Derive the AEAD key from an unlock secret with a record's parameters.
fn derive_key(unlock_secret: &str, params: &KdfParams) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::Kdf(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon
        .hash_password_into(unlock_secret.as_bytes(), &params.salt, key.as_mut())
        .map_err(|e| VaultError::Kdf(e.to_string()))?;
    Ok(key)
}

/// Seal plaintext under an unlock secret. Returns `(ciphertext, nonce,
/// kdf_params)` ready for persistence.
///
/// # Errors
///
/// Returns [`VaultError::Kdf`] or [`VaultError::Encrypt`].
pub fn seal(
    plaintext: &[u8],
    aad: &[u8],
    unlock_secret: &str,
) -> VaultResult<(Vec<u8>, Vec<u8>, KdfParams)> {
    let params = fresh_kdf_params();
    let key = derive_key(unlock_secret, &params)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| VaultError::Encrypt)?;

    Ok((ciphertext, nonce.to_vec(), params))
}

/// Open sealed ciphertext. Any mismatch - wrong secret, wrong AAD,
/// tampered bytes, malformed nonce - collapses to
/// [`VaultError::DecryptFailed`].
///
/// # Errors
///
/// Returns [`VaultError::Kdf`] or [`VaultError::DecryptFailed`].
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8],
    params: &KdfParams,
    aad: &[u8],
    unlock_secret: &str,
) -> VaultResult<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::DecryptFailed);
    }
    let key = derive_key(unlock_secret, params)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::DecryptFailed)?;

    Ok(Zeroizing::new(plaintext))
}

/// Burn one derivation without using its output. The missing-entry path
/// calls this so its latency matches a real failed decrypt.
pub(crate) fn decoy_derivation(unlock_secret: &str) {
    let params = KdfParams {
        salt: vec![0u8; SALT_LEN],
        memory_kib: DEFAULT_MEMORY_KIB,
        iterations: DEFAULT_ITERATIONS,
        parallelism: DEFAULT_PARALLELISM,
    };
    let _ = derive_key(unlock_secret, &params);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let (ciphertext, nonce, params) = seal(b"sk-ant-123", b"u1\0anthropic", "pw").unwrap();
        let plaintext = open(&ciphertext, &nonce, &params, b"u1\0anthropic", "pw").unwrap();
        assert_eq!(plaintext.as_slice(), b"sk-ant-123");
    }

    #[test]
    fn test_wrong_secret_fails() {
        let (ciphertext, nonce, params) = seal(b"key", b"aad", "pw").unwrap();
        let err = open(&ciphertext, &nonce, &params, b"aad", "not-pw").unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailed));
    }

    #[test]
    fn test_aad_binding() {
        let (ciphertext, nonce, params) = seal(b"key", b"u1\0anthropic", "pw").unwrap();
        let err = open(&ciphertext, &nonce, &params, b"u2\0anthropic", "pw").unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (mut ciphertext, nonce, params) = seal(b"key", b"aad", "pw").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(open(&ciphertext, &nonce, &params, b"aad", "pw").is_err());
    }

    #[test]
    fn test_each_seal_uses_fresh_nonce_and_salt() {
        let (c1, n1, p1) = seal(b"key", b"aad", "pw").unwrap();
        let (c2, n2, p2) = seal(b"key", b"aad", "pw").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(p1.salt, p2.salt);
        assert_ne!(c1, c2);
    }
}
