//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Key material is not valid hex
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Recovered signer differs from the claimed author
    #[error("Author mismatch: envelope claims {claimed}, signature recovers {recovered}")]
    AuthorMismatch {
        /// Address in the envelope
        claimed: String,
        /// Address recovered from the signature
        recovered: String,
    },

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// No key registered under the given name
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// Invalid input for cryptographic operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
