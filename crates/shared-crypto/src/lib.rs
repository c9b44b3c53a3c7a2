//! # Shared Crypto
//!
//! Signing primitives used by the transports.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 (recoverable) | Envelope authorship |
//! | `hashing` | Keccak-256 | Address derivation, signing digests |
//! | `seed` | 32-byte seed | Deterministic overlay identities |
//! | `registry` | — | Named signer lookup for config |
//! | `envelope` | — | Seal / open transport envelopes |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2)
//! - **Seeds**: zeroized on drop

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod ecdsa;
pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod registry;
pub mod seed;

// Re-exports
pub use ecdsa::{recover_address, EthereumKey};
pub use envelope::{open, seal};
pub use errors::CryptoError;
pub use hashing::keccak256;
pub use registry::{KeyRegistry, Signer};
pub use seed::Ed25519Seed;
