//! Seeds for deterministic overlay identities.

use crate::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Seed length in bytes.
pub const SEED_LENGTH: usize = 32;

/// A 32-byte ed25519 secret seed. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519Seed([u8; SEED_LENGTH]);

impl Ed25519Seed {
    #[must_use]
    pub fn new(bytes: [u8; SEED_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decode a hex seed, with or without `0x`. Must be exactly 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut raw = hex::decode(digits).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let result = <[u8; SEED_LENGTH]>::try_from(raw.as_slice())
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: SEED_LENGTH,
                actual: raw.len(),
            });
        raw.zeroize();
        result
    }

    /// Copy of the seed bytes; the caller owns zeroizing it.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SEED_LENGTH] {
        self.0
    }
}

impl std::fmt::Debug for Ed25519Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ed25519Seed(..)")
    }
}
