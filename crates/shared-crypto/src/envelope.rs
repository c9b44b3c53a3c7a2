//! # Envelope Sealing
//!
//! `seal` signs a message for a topic; `open` checks that the signature
//! recovers to the claimed author.

use crate::ecdsa::recover_address;
use crate::hashing::keccak256;
use crate::registry::Signer;
use crate::CryptoError;
use shared_types::{Envelope, Message};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sign `message` for `topic` at the current time.
pub fn seal(signer: &dyn Signer, topic: &str, message: Message) -> Result<Envelope, CryptoError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    seal_at(signer, topic, message, timestamp)
}

/// Sign `message` for `topic` with an explicit timestamp.
pub fn seal_at(
    signer: &dyn Signer,
    topic: &str,
    message: Message,
    timestamp: u64,
) -> Result<Envelope, CryptoError> {
    let author = signer.address();
    let bytes = Envelope::signing_bytes(topic, &message.body, timestamp, &author)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let signature = signer.sign_digest(&keccak256(&bytes))?;
    Ok(Envelope {
        topic: topic.to_string(),
        body: message.body,
        timestamp,
        author,
        signature,
        meta: message.meta,
    })
}

/// Verify that the envelope signature recovers to its author.
pub fn open(envelope: &Envelope) -> Result<(), CryptoError> {
    let bytes = envelope
        .canonical_bytes()
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let recovered = recover_address(&keccak256(&bytes), &envelope.signature)?;
    if recovered != envelope.author {
        return Err(CryptoError::AuthorMismatch {
            claimed: envelope.author.to_string(),
            recovered: recovered.to_string(),
        });
    }
    Ok(())
}
