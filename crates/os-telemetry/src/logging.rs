//! Structured logging.
//!
//! Every event carries a `subsystem` field. Faults additionally carry
//! `error` and, where an operator action is known, `advice`:
//! - `subsystem`: component name (transport, morph, supervisor, ...)
//! - `error`: rendered error
//! - `advice`: what the operator should do about it

use crate::{LogConfig, LogFormat, TelemetryError};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<bool, TelemetryError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::Filter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Json => builder
            .json()
            .with_current_span(false)
            .finish()
            .try_init()
            .is_ok(),
        LogFormat::Text => builder.finish().try_init().is_ok(),
    };

    if installed {
        tracing::debug!(
            level = %config.level,
            format = ?config.format,
            "Structured logging configured"
        );
    }
    Ok(installed)
}

/// Log an event with the standard `subsystem` field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a failure with the standard `subsystem` and `error` fields.
#[macro_export]
macro_rules! log_error {
    ($subsystem:expr, $err:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            subsystem = $subsystem,
            error = %$err,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an event that carries operator advice.
#[macro_export]
macro_rules! log_advice {
    ($level:ident, $subsystem:expr, $advice:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            advice = $advice,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            level: "oracle=loudest".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::Filter { .. })
        ));
    }

    #[test]
    fn test_second_init_is_noop() {
        let config = LogConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }

    #[test]
    fn test_macros_expand() {
        let err = std::io::Error::other("disk");
        crate::log_event!(info, "test", "plain event");
        crate::log_event!(debug, "test", "with fields", count = 3, name = %"x");
        crate::log_error!("test", err, "failure", path = "/tmp");
        crate::log_advice!(warn, "test", crate::ADVICE_REPORT, "advice");
    }
}
