//! Keccak-256 hashing.

use sha3::{Digest, Keccak256};

/// Keccak-256 (the pre-standard SHA-3 variant used by Ethereum).
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_function_selector() {
        // transfer(address,uint256)
        assert_eq!(
            hex::encode(&keccak256(b"transfer(address,uint256)")[..4]),
            "a9059cbb"
        );
    }
}
