//! # Oracle Morph
//!
//! Runtime reconfiguration of live services.
//!
//! A [`Morph`] engine periodically reads its cache file (an `env_vars`
//! map), re-decodes the embedded base configuration with those variables in
//! effect and passes each registered [`Reloadable`] service its subtree and
//! a version number. Snapshots are immutable; services swap to the new one.
//!
//! ```rust,ignore
//! let morph = Morph::<Config>::new(config.morph.clone(), vec![DEFAULT_CONFIG])?;
//! morph.register("ghost", ghost.clone(), |c: &Config| c.ghost.clone());
//! supervisor.watch(Arc::new(morph));
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod engine;
pub mod errors;

pub use config::{CacheFile, MorphConfig};
pub use engine::{Morph, Reloadable};
pub use errors::MorphError;
