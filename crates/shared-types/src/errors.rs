//! # Error Types
//!
//! Errors shared across subsystems.

use thiserror::Error;

/// Errors parsing an [`Address`](crate::Address).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid address hex: {0}")]
    InvalidHex(String),
}

/// Errors encoding or decoding an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("envelope encoding failed: {0}")]
    Encoding(String),

    #[error("envelope decoding failed: {0}")]
    Decoding(String),
}

/// Error returned by the [`Service`](crate::Service) lifecycle.
///
/// Cloneable so that every caller of `wait` observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// `start` was called on a service that was already started.
    #[error("{service}: service can be started only once")]
    AlreadyStarted { service: String },

    /// `wait` was called on a service that was never started.
    #[error("{service}: service is not started")]
    NotStarted { service: String },

    /// A configuration constraint was violated.
    #[error("{service}: validation failed: {reason}")]
    Validation { service: String, reason: String },

    /// Construction or start of a subsystem failed.
    #[error("{service}: {reason}")]
    Runtime { service: String, reason: String },

    /// A task of the service panicked.
    #[error("{service}: panicked: {reason}")]
    Panicked { service: String, reason: String },

    /// The service gave up after repeated faults.
    #[error("{service}: unrecoverable: {reason}")]
    Fatal { service: String, reason: String },
}

impl ServiceError {
    pub fn runtime(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::Runtime {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn validation(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::Validation {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Name of the service that produced the error.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::AlreadyStarted { service }
            | Self::NotStarted { service }
            | Self::Validation { service, .. }
            | Self::Runtime { service, .. }
            | Self::Panicked { service, .. }
            | Self::Fatal { service, .. } => service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::runtime("libp2p", "listen failed");
        assert_eq!(err.to_string(), "libp2p: listen failed");
        assert_eq!(err.service(), "libp2p");
        assert!(!err.is_panic());
    }

    #[test]
    fn test_panicked_is_panic() {
        let err = ServiceError::Panicked {
            service: "webapi".into(),
            reason: "boom".into(),
        };
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "webapi: panicked: boom");
    }
}
