//! # Key Registry
//!
//! Config refers to signing keys by name (`ethereum_key = "default"`). The
//! registry maps those names to [`Signer`]s.

use crate::ecdsa::EthereumKey;
use crate::CryptoError;
use parking_lot::RwLock;
use shared_types::{Address, Signature};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Something that can sign digests on behalf of an address.
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError>;
}

impl Signer for EthereumKey {
    fn address(&self) -> Address {
        EthereumKey::address(self)
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        EthereumKey::sign_digest(self, digest)
    }
}

/// Named signers.
#[derive(Default)]
pub struct KeyRegistry {
    keys: RwLock<BTreeMap<String, Arc<dyn Signer>>>,
}

impl KeyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `signer` under `name`, replacing any previous entry.
    pub fn insert(&self, name: impl Into<String>, signer: Arc<dyn Signer>) {
        let name = name.into();
        debug!(key = %name, address = %signer.address(), "Registered signing key");
        self.keys.write().insert(name, signer);
    }

    /// Generate and register a random in-memory key.
    pub fn insert_random(&self, name: impl Into<String>) -> Address {
        let key = EthereumKey::generate();
        let address = key.address();
        self.insert(name, Arc::new(key));
        address
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Signer>, CryptoError> {
        self.keys
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownKey(name.to_string()))
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.keys.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("keys", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let registry = KeyRegistry::new();
        assert!(registry.is_empty());
        let addr = registry.insert_random("default");
        assert_eq!(registry.get("default").unwrap().address(), addr);
        assert_eq!(registry.names(), vec!["default".to_string()]);
    }

    #[test]
    fn test_unknown_key() {
        let registry = KeyRegistry::new();
        assert_eq!(
            registry.get("missing").err(),
            Some(CryptoError::UnknownKey("missing".into()))
        );
    }

    #[test]
    fn test_replace() {
        let registry = KeyRegistry::new();
        let first = registry.insert_random("k");
        let second = registry.insert_random("k");
        assert_ne!(first, second);
        assert_eq!(registry.get("k").unwrap().address(), second);
    }
}
