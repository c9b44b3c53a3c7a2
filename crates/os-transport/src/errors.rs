//! Transport error types.

use shared_crypto::CryptoError;
use shared_types::{MessageError, ServiceError};
use thiserror::Error;

/// Errors returned by transports.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The topic is not served by this transport.
    #[error("topic {0:?} is not supported")]
    TopicNotSupported(String),

    /// A configuration constraint was violated.
    #[error("invalid transport configuration: {0}")]
    Validation(String),

    /// Broadcasting requires a signing key.
    #[error("no signing key configured")]
    NoSigner,

    /// The transport is not running (not started, or already stopped).
    #[error("transport is not running")]
    NotRunning,

    #[error("signing failed: {0}")]
    Signing(#[from] CryptoError),

    #[error("envelope encoding failed: {0}")]
    Encoding(#[from] MessageError),

    /// The overlay or remote endpoint refused the message.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The underlying transport panicked while handling the call.
    #[error("transport panicked: {0}")]
    Panicked(String),

    #[error("transport construction failed: {0}")]
    Construction(String),

    #[error(transparent)]
    AddressBook(#[from] AddressBookError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TransportError {
    /// Convert into the service error reported by `start`/`wait`.
    #[must_use]
    pub fn into_service(self, service: &str) -> ServiceError {
        match self {
            TransportError::Service(err) => err,
            TransportError::Validation(reason) => ServiceError::validation(service, reason),
            other => ServiceError::runtime(service, other),
        }
    }
}

/// Errors returned by address books.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressBookError {
    /// The JSON-RPC endpoint failed or returned an error object.
    #[error("rpc call failed: {0}")]
    Rpc(String),

    /// The contract returned data that is not an ABI `string[]`.
    #[error("invalid contract response: {0}")]
    Decode(String),

    /// No RPC endpoint is configured for the reader.
    #[error("no rpc endpoints configured")]
    NoEndpoints,
}
