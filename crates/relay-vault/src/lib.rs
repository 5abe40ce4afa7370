//! Relay Vault - BYOK material, encrypted at rest.
//!
//! The encryption key is derived (Argon2id) from a caller-supplied unlock
//! secret; the server alone cannot decrypt. Ciphertext is
//! XChaCha20-Poly1305 with the `(user, provider)` pair bound as AAD, so a
//! record copied between rows fails authentication. KDF parameters travel
//! with each record.
//!
//! A wrong unlock secret and a missing entry are indistinguishable: both
//! return [`VaultError::DecryptFailed`], and the missing-entry path runs a
//! decoy derivation so the two cases stay timing-aligned.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cipher;
pub mod error;
pub mod store;

pub use error::{VaultError, VaultResult};
pub use store::{KeyStatus, SecretVault};
