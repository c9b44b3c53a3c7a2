//! # Envelope Policy
//!
//! [`InboundFilter`] decides whether a received envelope may be delivered;
//! [`Sealer`] signs outgoing messages for the transport's topics.
//!
//! Inbound checks run in order: topic served, signature recovers to the
//! author, author on the allow-list (gated topics only).

use crate::domain::AllowList;
use crate::errors::TransportError;
use shared_crypto::{open, seal, CryptoError, Signer};
use shared_types::{Address, Envelope, Message, TopicSet};
use std::sync::Arc;
use thiserror::Error;

/// Why an inbound envelope was dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejection {
    #[error("topic {0:?} is not served")]
    UnknownTopic(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),

    #[error("author {0} is not an allowed feed")]
    NotAllowed(Address),
}

#[derive(Debug, Clone)]
pub struct InboundFilter {
    topics: TopicSet,
    allow: Arc<AllowList>,
}

impl InboundFilter {
    #[must_use]
    pub fn new(topics: TopicSet, allow: Arc<AllowList>) -> Self {
        Self { topics, allow }
    }

    pub fn check(&self, envelope: &Envelope) -> Result<(), Rejection> {
        let topic = self
            .topics
            .get(&envelope.topic)
            .ok_or_else(|| Rejection::UnknownTopic(envelope.topic.clone()))?;
        open(envelope)?;
        if topic.gated && !self.allow.permits(&envelope.author) {
            return Err(Rejection::NotAllowed(envelope.author));
        }
        Ok(())
    }

    #[must_use]
    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }
}

/// Signs outgoing messages with the configured key.
#[derive(Clone)]
pub struct Sealer {
    signer: Option<Arc<dyn Signer>>,
    topics: TopicSet,
}

impl Sealer {
    #[must_use]
    pub fn new(signer: Option<Arc<dyn Signer>>, topics: TopicSet) -> Self {
        Self { signer, topics }
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn seal(&self, topic: &str, message: Message) -> Result<Envelope, TransportError> {
        if !self.topics.contains(topic) {
            return Err(TransportError::TopicNotSupported(topic.to_string()));
        }
        let signer = self.signer.as_deref().ok_or(TransportError::NoSigner)?;
        Ok(seal(signer, topic, message)?)
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer")
            .field("address", &self.address())
            .field("topics", &self.topics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::EthereumKey;
    use shared_types::{default_topics, TOPIC_GREET, TOPIC_PRICE};

    fn sealer(key: &Arc<EthereumKey>) -> Sealer {
        Sealer::new(Some(key.clone() as Arc<dyn Signer>), default_topics())
    }

    #[test]
    fn test_allowed_author_passes() {
        let key = Arc::new(EthereumKey::generate());
        let filter = InboundFilter::new(
            default_topics(),
            Arc::new(AllowList::new([key.address()], false)),
        );
        let envelope = sealer(&key).seal(TOPIC_PRICE, Message::new("1.0")).unwrap();
        assert_eq!(filter.check(&envelope), Ok(()));
    }

    #[test]
    fn test_unlisted_author_rejected_on_gated_topic() {
        let key = Arc::new(EthereumKey::generate());
        let filter = InboundFilter::new(default_topics(), Arc::new(AllowList::default()));
        let envelope = sealer(&key).seal(TOPIC_PRICE, Message::new("1.0")).unwrap();
        assert_eq!(
            filter.check(&envelope),
            Err(Rejection::NotAllowed(key.address()))
        );
    }

    #[test]
    fn test_open_topic_skips_allow_list() {
        let key = Arc::new(EthereumKey::generate());
        let filter = InboundFilter::new(default_topics(), Arc::new(AllowList::default()));
        let envelope = sealer(&key).seal(TOPIC_GREET, Message::new("hi")).unwrap();
        assert_eq!(filter.check(&envelope), Ok(()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let key = Arc::new(EthereumKey::generate());
        let filter = InboundFilter::new(default_topics(), Arc::new(AllowList::permissive()));
        let mut envelope = sealer(&key).seal(TOPIC_PRICE, Message::new("1.0")).unwrap();
        envelope.body = b"9.9".to_vec();
        assert!(matches!(
            filter.check(&envelope),
            Err(Rejection::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_seal_unknown_topic() {
        let key = Arc::new(EthereumKey::generate());
        assert_eq!(
            sealer(&key).seal("nope/v1", Message::new("x")).unwrap_err(),
            TransportError::TopicNotSupported("nope/v1".into())
        );
    }

    #[test]
    fn test_seal_without_signer() {
        let sealer = Sealer::new(None, default_topics());
        assert_eq!(
            sealer.seal(TOPIC_PRICE, Message::new("x")).unwrap_err(),
            TransportError::NoSigner
        );
    }
}
