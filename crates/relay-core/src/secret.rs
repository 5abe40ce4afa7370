//! Zeroize-on-drop secret wrapper.

use zeroize::Zeroizing;

/// A string holding credential material.
///
/// The inner buffer is zeroed when the value is dropped. `Debug` and
/// `Display` never print the content, and the type deliberately does not
/// implement `Serialize`, so a secret cannot reach a wire payload or a log
/// line by accident. Access goes through [`SecretString::expose`].
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    /// Wrap a plaintext secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plaintext.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short keyed-hash fingerprint for logs and status displays.
    ///
    /// Safe to print: eight hex characters of a one-way hash.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        hex::encode(&digest.as_bytes()[..4])
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretString")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Deserializes from a plain string so request payloads can carry keys and
/// unlock secrets; the reverse direction is intentionally unimplemented.
impl<'de> serde::Deserialize<'de> for SecretString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts() {
        let secret = SecretString::new("sk-ant-very-secret");
        let rendered = format!("{secret:?} {secret}");
        assert!(!rendered.contains("sk-ant"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn test_expose_round_trip() {
        let secret = SecretString::new("abc");
        assert_eq!(secret.expose(), "abc");
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = SecretString::new("key-1");
        let b = SecretString::new("key-1");
        let c = SecretString::new("key-2");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
    }
}
