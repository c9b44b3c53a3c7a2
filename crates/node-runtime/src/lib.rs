//! # Node Runtime Library
//!
//! Building blocks of the `ghost` binary, exposed for testing:
//!
//! - `cli`: command line and the load-or-dump decision
//! - `config`: root config schema and embedded defaults
//! - `ghost`: the ghost service
//! - `node`: service construction and supervision

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cli;
pub mod config;
pub mod ghost;
pub mod node;

pub use cli::{Cli, Startup};
pub use config::{Config, DEFAULT_CONFIG};
pub use ghost::{GhostService, Greeting};
pub use node::Node;
