//! # Transport Port
//!
//! Every transport (gossip, HTTP, chain, recoverer) is a [`Service`] that
//! can broadcast a message to a topic and hand out per-topic subscriptions.

use crate::errors::TransportError;
use async_trait::async_trait;
use shared_types::{Message, ReceivedMessage, Service, ServiceError};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A peer messaging transport.
#[async_trait]
pub trait Transport: Service {
    /// Sign `message` and send it to every peer serving `topic`.
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError>;

    /// Messages accepted on `topic` from now on.
    ///
    /// An unknown topic yields a subscription that ends immediately. The
    /// subscription ends when the transport stops.
    fn messages(&self, topic: &str) -> Subscription;
}

/// View a transport as a plain service (for the supervisor).
#[must_use]
pub fn as_service(transport: Arc<dyn Transport>) -> Arc<dyn Service> {
    Arc::new(TransportService(transport))
}

struct TransportService(Arc<dyn Transport>);

#[async_trait]
impl Service for TransportService {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.0.start(ctx).await
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.0.wait().await
    }
}

/// A stream of messages accepted on one topic.
pub struct Subscription {
    inner: Pin<Box<dyn Stream<Item = ReceivedMessage> + Send>>,
}

impl Subscription {
    pub fn new(stream: impl Stream<Item = ReceivedMessage> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Subscription fed by a broadcast channel. Lagged messages are skipped.
    pub fn from_receiver(topic: &str, rx: broadcast::Receiver<ReceivedMessage>) -> Self {
        let topic = topic.to_string();
        Self::new(BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(message) => Some(message),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(topic = %topic, skipped, "Subscriber lagged, messages dropped");
                None
            }
        }))
    }

    /// A subscription that yields nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(tokio_stream::empty())
    }

    /// Next message, or `None` once the subscription ended.
    pub async fn recv(&mut self) -> Option<ReceivedMessage> {
        self.inner.next().await
    }
}

impl Stream for Subscription {
    type Item = ReceivedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
