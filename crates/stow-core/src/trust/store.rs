//! Named ed25519 public keys trusted to sign artifacts.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::VerifyingKey;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keys: BTreeMap<String, VerifyingKey>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `name -> base64 public key` pairs.
    pub fn from_base64_keys(keys: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut store = Self::new();
        for (name, encoded) in keys {
            store.add_key(name, decode_public_key(name, encoded)?);
        }
        Ok(store)
    }

    pub fn with_key(mut self, name: impl Into<String>, key: VerifyingKey) -> Self {
        self.add_key(name, key);
        self
    }

    pub fn add_key(&mut self, name: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(name.into(), key);
    }

    pub fn key(&self, name: &str) -> Option<&VerifyingKey> {
        self.keys.get(name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Decode a base64 ed25519 public key.
pub fn decode_public_key(name: &str, encoded: &str) -> Result<VerifyingKey, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidKey {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| invalid("not valid base64"))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| invalid("expected 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| invalid("not an ed25519 public key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn decodes_configured_keys() {
        let key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let mut config = BTreeMap::new();
        config.insert("release".to_string(), Base64.encode(key.as_bytes()));

        let store = TrustStore::from_base64_keys(&config).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.key("release"), Some(&key));
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(matches!(
            decode_public_key("k", "%%%"),
            Err(ConfigError::InvalidKey { .. })
        ));
        let short = Base64.encode([1u8; 16]);
        let err = decode_public_key("k", &short).unwrap_err();
        assert_eq!(err.to_string(), "trusted key `k` is invalid: expected 32 bytes");
    }
}
