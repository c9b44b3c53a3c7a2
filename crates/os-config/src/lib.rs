//! # Oracle Config
//!
//! HCL configuration loading for the oracle suite.
//!
//! ## Features
//!
//! - Several sources merged in order (files from the CLI or embedded defaults)
//! - `variables { ... }` blocks with self-references, resolved lazily with
//!   cycle detection
//! - `env()`/`env_list()` answered by an [`EnvSource`] instead of the raw
//!   process environment, with every referenced name recorded
//! - Accumulated [`Diagnostics`] instead of first-error-wins
//!
//! ## Usage
//!
//! ```rust,ignore
//! use os_config::{EnvSource, Loader};
//!
//! let outcome = Loader::new(EnvSource::os()).load_files::<MyConfig, _>(&paths)?;
//! println!("{:?}", outcome.env_refs);
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod diagnostics;
pub mod dump;
pub mod env;
pub mod functions;
pub mod loader;
pub mod merge;
pub mod variables;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity, SourceRange};
pub use dump::DumpFlags;
pub use env::{EnvSource, EvalScope};
pub use loader::{LoadOutcome, Loader, Source};
pub use variables::{resolve_variables, split_variables, VariableTree};
