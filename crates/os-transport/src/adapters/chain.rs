//! # Chained Transport
//!
//! Several transports behind one publish/subscribe surface. Broadcasts go
//! to every child concurrently; subscriptions merge the children's streams
//! with no ordering across transports.

use crate::errors::TransportError;
use crate::ports::{Subscription, Transport};
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::select_all;
use shared_types::{Lifecycle, Message, Service, ServiceError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ChainTransport {
    lifecycle: Arc<Lifecycle>,
    children: Vec<Arc<dyn Transport>>,
}

impl ChainTransport {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new("chain")),
            children,
        }
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<dyn Transport>] {
        &self.children
    }
}

#[async_trait]
impl Service for ChainTransport {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let scope = ctx.child_token();
        for (index, child) in self.children.iter().enumerate() {
            if let Err(err) = child.start(scope.clone()).await {
                scope.cancel();
                for started in &self.children[..index] {
                    if let Err(err) = started.wait().await {
                        debug!(transport = %started.name(), error = %err, "Transport stopped with error during abort");
                    }
                }
                self.lifecycle.finish(Err(err.clone()));
                return Err(err);
            }
        }

        let children = self.children.clone();
        let task = tokio::spawn(async move {
            let results = join_all(children.iter().map(|c| c.wait())).await;
            let mut first = None;
            for (child, result) in children.iter().zip(results) {
                if let Err(err) = result {
                    if first.is_none() {
                        first = Some(err);
                    } else {
                        warn!(transport = %child.name(), error = %err, "Transport stopped with error");
                    }
                }
            }
            first.map_or(Ok(()), Err)
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[async_trait]
impl Transport for ChainTransport {
    /// Every child gets the message, even after one fails; the first error
    /// is returned. Nothing is rolled back.
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        let results = join_all(
            self.children
                .iter()
                .map(|child| child.broadcast(topic, message.clone())),
        )
        .await;
        let mut first = None;
        for (child, result) in self.children.iter().zip(results) {
            if let Err(err) = result {
                debug!(transport = %child.name(), topic, error = %err, "Broadcast failed");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn messages(&self, topic: &str) -> Subscription {
        Subscription::new(select_all(self.children.iter().map(|c| c.messages(topic))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalTransport;
    use crate::domain::AllowList;
    use shared_crypto::{EthereumKey, Signer};
    use shared_types::{default_topics, TOPIC_PRICE};

    fn local(name: &str, signer: Option<Arc<dyn Signer>>) -> Arc<dyn Transport> {
        Arc::new(LocalTransport::new(name, signer, default_topics(), AllowList::default()))
    }

    #[tokio::test]
    async fn test_broadcast_succeeds_when_all_succeed() {
        let key: Arc<dyn Signer> = Arc::new(EthereumKey::generate());
        let chain = ChainTransport::new(vec![local("a", Some(key.clone())), local("b", Some(key))]);
        let ctx = CancellationToken::new();
        chain.start(ctx.clone()).await.unwrap();

        let mut sub = chain.messages(TOPIC_PRICE);
        chain.broadcast(TOPIC_PRICE, Message::new("1")).await.unwrap();
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_some());

        ctx.cancel();
        chain.wait().await.unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_fails_when_one_fails() {
        let key: Arc<dyn Signer> = Arc::new(EthereumKey::generate());
        let chain = ChainTransport::new(vec![local("a", Some(key)), local("b", None)]);
        chain.start(CancellationToken::new()).await.unwrap();
        assert_eq!(
            chain.broadcast(TOPIC_PRICE, Message::new("1")).await,
            Err(TransportError::NoSigner)
        );
    }

    #[tokio::test]
    async fn test_start_stops_at_first_failure() {
        let a = local("a", None);
        let chain = ChainTransport::new(vec![a.clone(), a]);
        assert!(matches!(
            chain.start(CancellationToken::new()).await,
            Err(ServiceError::AlreadyStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_start_stops_started_children() {
        let a = local("a", None);
        let b = local("b", None);
        let elsewhere = CancellationToken::new();
        b.start(elsewhere.clone()).await.unwrap();

        let ctx = CancellationToken::new();
        let chain = ChainTransport::new(vec![a.clone(), b.clone()]);
        assert!(chain.start(ctx.clone()).await.is_err());

        tokio::time::timeout(std::time::Duration::from_secs(1), a.wait())
            .await
            .expect("started child left running")
            .unwrap();
        assert!(!ctx.is_cancelled());
        assert!(!elsewhere.is_cancelled());
        elsewhere.cancel();
        b.wait().await.unwrap();
    }
}
