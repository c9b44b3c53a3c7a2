//! The `morph` config block and the cache file layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `morph` config block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphConfig {
    pub cache_path: String,
    /// Seconds between reload cycles. Must be positive.
    pub interval: u64,
    /// Stop reloading after the first cycle.
    pub one_shot: bool,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            cache_path: "./morph.cache.hcl".to_string(),
            interval: 3600,
            one_shot: false,
        }
    }
}

/// Contents of the morph cache file: `env_vars = { KEY = "value" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheFile {
    pub env_vars: BTreeMap<String, String>,
}
