//! # Oracle Telemetry
//!
//! Structured logging for the oracle suite, built on `tracing`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use os_telemetry::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env();
//! init_logging(&config)?;
//! os_telemetry::log_event!(info, "morph", "Configuration reloaded", version = 3);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `OS_JSON_LOGS` | `false` | Emit JSON lines instead of text |
//! | `OS_LOG_TARGET` | `true` | Include the event target |

mod config;
mod logging;

pub use config::{LogConfig, LogFormat};
pub use logging::init_logging;

use thiserror::Error;

/// Advice attached to faults that indicate a bug rather than an environment
/// problem.
pub const ADVICE_REPORT: &str = "Report immediately to the development team";

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("Invalid log format: {0}")]
    Format(String),

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}
