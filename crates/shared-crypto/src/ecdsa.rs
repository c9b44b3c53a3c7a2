//! # ECDSA Signatures (secp256k1)
//!
//! Recoverable secp256k1 signatures in the Ethereum convention.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - Constant-time operations
//!
//! ## Addresses
//!
//! An address is the last 20 bytes of the Keccak-256 hash of the
//! uncompressed public key without its `0x04` prefix. Signatures are
//! `r || s || v` with `v = 27 + recovery_id`, so the author can be recovered
//! from a signature and digest alone.

use crate::hashing::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use shared_types::message::SIGNATURE_LENGTH;
use shared_types::{Address, Signature};
use std::fmt;
use zeroize::Zeroize;

/// Offset added to the recovery id in the `v` byte.
const V_OFFSET: u8 = 27;

/// secp256k1 signing key with its derived address.
#[derive(Clone)]
pub struct EthereumKey {
    signing_key: SigningKey,
    address: Address,
}

impl EthereumKey {
    /// Generate random key.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create from a hex-encoded secret key, with or without `0x`.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut raw = hex::decode(digits).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let result = <[u8; 32]>::try_from(raw.as_slice())
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: raw.len(),
            })
            .and_then(|mut bytes| {
                let key = Self::from_bytes(bytes);
                bytes.zeroize();
                key
            });
        raw.zeroize();
        result
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + V_OFFSET;
        Ok(Signature(out))
    }

    /// Hash `data` with Keccak-256 and sign the digest.
    pub fn sign(&self, data: &[u8]) -> Result<Signature, CryptoError> {
        self.sign_digest(&keccak256(data))
    }
}

impl fmt::Debug for EthereumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Address of a public key.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::new(out)
}

/// Recover the signer address of `digest`.
pub fn recover_address(digest: &[u8; 32], signature: &Signature) -> Result<Address, CryptoError> {
    let bytes = signature.as_bytes();
    let v = bytes[64];
    let recovery_byte = if v >= V_OFFSET { v - V_OFFSET } else { v };
    let recovery_id = RecoveryId::from_byte(recovery_byte).ok_or(CryptoError::InvalidSignature)?;
    let sig = EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;
    Ok(address_of(&key))
}
