//! # Ghost Configuration
//!
//! Root schema of the `ghost` config and the embedded defaults used when no
//! `-c` file is given (and by every morph reload).

use os_morph::MorphConfig;
use os_transport::{EthereumClientConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use shared_crypto::{CryptoError, EthereumKey, KeyRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The embedded base configuration.
pub const DEFAULT_CONFIG: &[u8] = include_bytes!("../config/ghost.hcl");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ethereum: EthereumConfig,
    pub transport: TransportConfig,
    pub ghost: GhostConfig,
    pub morph: Option<MorphConfig>,
}

/// The `ethereum` block: signing keys and RPC clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EthereumConfig {
    /// Names of keys generated at start-up and kept in memory.
    pub rand_keys: Vec<String>,
    pub key: BTreeMap<String, KeyConfig>,
    pub client: BTreeMap<String, EthereumClientConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    /// Hex-encoded secp256k1 secret.
    pub private_key: String,
}

impl EthereumConfig {
    /// Build the key registry described by this block.
    pub fn key_registry(&self) -> Result<KeyRegistry, CryptoError> {
        let keys = KeyRegistry::new();
        for name in &self.rand_keys {
            keys.insert_random(name.clone());
        }
        for (name, key) in &self.key {
            keys.insert(name.clone(), Arc::new(EthereumKey::from_hex(&key.private_key)?));
        }
        Ok(keys)
    }
}

/// The `ghost` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GhostConfig {
    pub ethereum_key: Option<String>,
    /// Seconds between broadcasts.
    pub interval: u64,
    pub data_models: Vec<String>,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            ethereum_key: None,
            interval: 60,
            data_models: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use os_config::{EnvSource, Loader};

    fn load(vars: &[(&str, &str)]) -> Config {
        let env = EnvSource::isolated(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        Loader::new(env).load_embeds::<Config>(&[DEFAULT_CONFIG]).unwrap().config
    }

    #[test]
    fn test_embedded_defaults_decode() {
        let config = load(&[]);
        assert_eq!(config.ethereum.rand_keys, vec!["default".to_string()]);
        assert!(config.ghost.data_models.is_empty());
        assert_eq!(config.morph.unwrap().interval, 3600);
        let libp2p = config.transport.libp2p.unwrap();
        assert_eq!(libp2p.listen_addrs, vec!["/ip4/0.0.0.0/tcp/8000".to_string()]);
    }

    #[test]
    fn test_models_come_from_environment() {
        let config = load(&[("GHOST_MODELS", "BTC/USD,ETH/USD")]);
        assert_eq!(config.ghost.data_models, vec!["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn test_key_registry() {
        let mut ethereum = EthereumConfig {
            rand_keys: vec!["a".to_string()],
            ..EthereumConfig::default()
        };
        ethereum.key.insert(
            "b".to_string(),
            KeyConfig {
                private_key: "01".repeat(32),
            },
        );
        let keys = ethereum.key_registry().unwrap();
        assert_eq!(keys.names(), vec!["a".to_string(), "b".to_string()]);

        ethereum.key.insert(
            "bad".to_string(),
            KeyConfig {
                private_key: "zz".to_string(),
            },
        );
        assert!(ethereum.key_registry().is_err());
    }

    #[test]
    fn test_unknown_block_rejected() {
        let result = Loader::new(EnvSource::isolated(Default::default()))
            .load_embeds::<Config>(&[b"ghosts { interval = 1 }".as_slice()]);
        assert!(result.is_err());
    }
}
