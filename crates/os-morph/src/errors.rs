//! Morph engine errors.

use os_config::Diagnostics;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MorphError {
    /// A configuration constraint was violated.
    #[error("invalid morph configuration: {0}")]
    Validation(String),

    /// The cache file could not be read or decoded.
    #[error("failed to load morph cache {path}: {diagnostics}")]
    Cache { path: String, diagnostics: Diagnostics },

    /// The base configuration did not decode with the cached variables.
    #[error("failed to reload configuration: {0}")]
    Reload(Diagnostics),

    /// A registered service refused its new configuration.
    #[error("service {service} rejected configuration: {reason}")]
    Handler { service: String, reason: String },
}
