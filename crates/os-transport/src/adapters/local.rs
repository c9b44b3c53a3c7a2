//! # Local Transport
//!
//! In-process loopback: every broadcast is sealed, passed through the
//! inbound filter and delivered to this transport's own subscribers.
//! Used by tests and single-node setups.

use crate::domain::{AllowList, InboundFilter, Sealer, TopicHub};
use crate::errors::TransportError;
use crate::ports::{Subscription, Transport};
use async_trait::async_trait;
use shared_crypto::Signer;
use shared_types::{Lifecycle, Message, ReceivedMessage, Service, ServiceError, TopicSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct LocalTransport {
    lifecycle: Arc<Lifecycle>,
    sealer: Sealer,
    filter: InboundFilter,
    hub: Arc<TopicHub>,
}

impl LocalTransport {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        signer: Option<Arc<dyn Signer>>,
        topics: TopicSet,
        allow: AllowList,
    ) -> Self {
        let sealer = Sealer::new(signer, topics.clone());
        let allow = Arc::new(allow.with_signer(sealer.address()));
        Self {
            lifecycle: Arc::new(Lifecycle::new(name)),
            hub: Arc::new(TopicHub::new(&topics)),
            filter: InboundFilter::new(topics, allow),
            sealer,
        }
    }
}

#[async_trait]
impl Service for LocalTransport {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let lifecycle = Arc::clone(&self.lifecycle);
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            ctx.cancelled().await;
            hub.close();
            lifecycle.finish(Ok(()));
        });
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        if !self.lifecycle.is_started() || self.lifecycle.is_finished() {
            return Err(TransportError::NotRunning);
        }
        let envelope = self.sealer.seal(topic, message)?;
        match self.filter.check(&envelope) {
            Ok(()) => {
                self.hub.publish(ReceivedMessage::new(envelope, self.name()));
            }
            Err(rejection) => {
                debug!(transport = %self.name(), %rejection, "Loopback message rejected");
            }
        }
        Ok(())
    }

    fn messages(&self, topic: &str) -> Subscription {
        self.hub.subscribe(topic)
    }
}
