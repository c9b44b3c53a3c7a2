//! Logging configuration from environment variables and CLI flags.

use crate::TelemetryError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::Format(other.to_string())),
        }
    }
}

/// Configuration for the log subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full `EnvFilter` directive)
    pub level: String,

    pub format: LogFormat,

    /// Whether to print the event target
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `OS_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `OS_LOG_TARGET`: Print event targets (default: true)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            level: env::var("OS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            format: env::var("OS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .map(|json| if json { LogFormat::Json } else { LogFormat::Text })
                .unwrap_or_default(),

            with_target: env::var("OS_LOG_TARGET")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    /// Apply CLI overrides on top of this configuration.
    #[must_use]
    pub fn with_overrides(mut self, level: Option<&str>, format: Option<LogFormat>) -> Self {
        if let Some(level) = level {
            self.level = level.to_string();
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.with_target);
    }

    #[test]
    fn test_overrides() {
        let config = LogConfig::default().with_overrides(Some("debug"), Some(LogFormat::Json));
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);

        let untouched = LogConfig::default().with_overrides(None, None);
        assert_eq!(untouched, LogConfig::default());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
