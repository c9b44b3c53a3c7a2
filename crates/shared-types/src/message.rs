//! # Messages and Envelopes
//!
//! A [`Message`] is what a producer hands to a transport: an opaque body plus
//! optional metadata. The transport seals it into an [`Envelope`] carrying the
//! topic, author, timestamp and a recoverable secp256k1 signature.
//!
//! ## Canonical Encoding
//!
//! The signature covers the Keccak-256 hash of the bincode encoding of
//! `(topic, body, timestamp, author_bytes)`. Metadata is not signed; it is
//! advisory and may be rewritten by relays.

use crate::address::Address;
use crate::errors::MessageError;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Length of a recoverable signature: `r || s || v`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Unsigned payload submitted for broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: Vec<u8>,
    pub meta: BTreeMap<String, String>,
}

impl Message {
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            meta: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// A 65-byte recoverable signature.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde_as(as = "Hex")] pub [u8; SIGNATURE_LENGTH]);

impl Signature {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_LENGTH])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

/// A signed message as it travels on the wire.
///
/// JSON renders `body` and `signature` as hex strings; gossip frames use
/// bincode of the same structure.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde_as(as = "Hex")]
    pub body: Vec<u8>,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    pub author: Address,
    pub signature: Signature,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Envelope {
    /// Bytes covered by the signature.
    pub fn signing_bytes(
        topic: &str,
        body: &[u8],
        timestamp: u64,
        author: &Address,
    ) -> Result<Vec<u8>, MessageError> {
        bincode::serialize(&(topic, body, timestamp, author.as_bytes()))
            .map_err(|e| MessageError::Encoding(e.to_string()))
    }

    /// Signing bytes of this envelope.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Self::signing_bytes(&self.topic, &self.body, self.timestamp, &self.author)
    }

    /// Gossip wire form.
    pub fn to_wire(&self) -> Result<Vec<u8>, MessageError> {
        bincode::serialize(self).map_err(|e| MessageError::Encoding(e.to_string()))
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, MessageError> {
        bincode::deserialize(bytes).map_err(|e| MessageError::Decoding(e.to_string()))
    }

    /// The unsigned payload carried by this envelope.
    #[must_use]
    pub fn message(&self) -> Message {
        Message {
            body: self.body.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// An envelope accepted by a transport, with delivery details.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub envelope: Envelope,
    /// Transport-specific origin: a peer id or a remote socket address.
    pub source: String,
    pub received_at: SystemTime,
}

impl ReceivedMessage {
    #[must_use]
    pub fn new(envelope: Envelope, source: impl Into<String>) -> Self {
        Self {
            envelope,
            source: source.into(),
            received_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn author(&self) -> Address {
        self.envelope.author
    }
}
