//! # Recoverer
//!
//! Keeps a transport alive across panics. The wrapped transport is built by
//! a factory; when a broadcast panics or its background work dies with a
//! panic, the failure is logged, the instance is torn down and a fresh one
//! is created and started.
//!
//! Subscriptions handed out by the recoverer are fed from its own topic
//! channels, so they survive restarts. Too many panics inside the policy
//! window shut the recoverer down with a fatal error.

use crate::domain::TopicHub;
use crate::errors::TransportError;
use crate::ports::{Subscription, Transport};
use async_trait::async_trait;
use futures::FutureExt;
use os_telemetry::{log_advice, ADVICE_REPORT};
use parking_lot::{Mutex, RwLock};
use shared_types::{panic_message, Lifecycle, Message, Service, ServiceError, TopicSet};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SUBSYSTEM: &str = "recoverer";

/// Builds a fresh instance of the wrapped transport.
pub type TransportFactory = Arc<dyn Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

/// How many panics are tolerated, and over what window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_panics: usize,
    pub window: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_panics: 3,
            window: Duration::from_secs(60),
        }
    }
}

struct Shared {
    factory: TransportFactory,
    policy: RecoveryPolicy,
    topics: TopicSet,
    hub: Arc<TopicHub>,
    current: RwLock<Option<Arc<dyn Transport>>>,
    panics: Mutex<VecDeque<Instant>>,
    restarts: RwLock<u64>,
}

impl Shared {
    /// Create, start and wire up a new instance under `ctx`.
    async fn launch(
        &self,
        ctx: &CancellationToken,
    ) -> Result<(Arc<dyn Transport>, CancellationToken), ServiceError> {
        let child = (self.factory)().map_err(|e| e.into_service(SUBSYSTEM))?;
        let token = ctx.child_token();
        child.start(token.clone()).await?;

        for topic in self.topics.names() {
            let mut messages = child.messages(topic);
            let hub = Arc::clone(&self.hub);
            let token = token.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        message = messages.recv() => match message {
                            Some(message) => {
                                hub.publish(message);
                            }
                            None => break,
                        },
                    }
                }
            });
        }

        *self.current.write() = Some(Arc::clone(&child));
        debug!(transport = %child.name(), "Transport instance started");
        Ok((child, token))
    }

    /// Record a panic; true once the policy is exhausted.
    fn record_panic(&self) -> bool {
        let now = Instant::now();
        let mut panics = self.panics.lock();
        panics.push_back(now);
        while panics
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.policy.window)
        {
            panics.pop_front();
        }
        panics.len() > self.policy.max_panics
    }

    async fn supervise(
        self: Arc<Self>,
        ctx: CancellationToken,
        mut child: Arc<dyn Transport>,
        mut token: CancellationToken,
        mut broadcast_panics: mpsc::UnboundedReceiver<String>,
    ) -> Result<(), ServiceError> {
        loop {
            let reason = tokio::select! {
                _ = ctx.cancelled() => {
                    let _ = child.wait().await;
                    return Ok(());
                }
                result = child.wait() => match result {
                    Err(err) if err.is_panic() => err.to_string(),
                    _ if ctx.is_cancelled() => return Ok(()),
                    other => return other,
                },
                Some(reason) = broadcast_panics.recv() => reason,
            };

            log_advice!(
                error,
                SUBSYSTEM,
                ADVICE_REPORT,
                "Transport panicked",
                transport = %child.name(),
                reason = %reason
            );
            token.cancel();
            let _ = child.wait().await;
            *self.current.write() = None;

            if self.record_panic() {
                return Err(ServiceError::Fatal {
                    service: SUBSYSTEM.to_string(),
                    reason: format!(
                        "recovery exhausted: more than {} panics within {:?}",
                        self.policy.max_panics, self.policy.window
                    ),
                });
            }

            *self.restarts.write() += 1;
            (child, token) = self.launch(&ctx).await?;
            info!(transport = %child.name(), "Transport restarted");
        }
    }
}

pub struct Recoverer {
    lifecycle: Arc<Lifecycle>,
    shared: Arc<Shared>,
    panic_tx: mpsc::UnboundedSender<String>,
    panic_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Recoverer {
    /// Wrap the transports built by `factory`, serving `topics`.
    #[must_use]
    pub fn new(factory: TransportFactory, topics: TopicSet, policy: RecoveryPolicy) -> Self {
        let (panic_tx, panic_rx) = mpsc::unbounded_channel();
        Self {
            lifecycle: Arc::new(Lifecycle::new(SUBSYSTEM)),
            shared: Arc::new(Shared {
                factory,
                policy,
                hub: Arc::new(TopicHub::new(&topics)),
                topics,
                current: RwLock::new(None),
                panics: Mutex::new(VecDeque::new()),
                restarts: RwLock::new(0),
            }),
            panic_tx,
            panic_rx: Mutex::new(Some(panic_rx)),
        }
    }

    /// Number of restarts attempted so far.
    #[must_use]
    pub fn restarts(&self) -> u64 {
        *self.shared.restarts.read()
    }
}

#[async_trait]
impl Service for Recoverer {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let panic_rx = self.panic_rx.lock().take();
        let launched = match panic_rx {
            Some(rx) => self.shared.launch(&ctx).await.map(|(c, t)| (c, t, rx)),
            None => Err(ServiceError::runtime(SUBSYSTEM, "panic channel already taken")),
        };
        let (child, token, panic_rx) = match launched {
            Ok(launched) => launched,
            Err(err) => {
                self.lifecycle.finish(Err(err.clone()));
                return Err(err);
            }
        };

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let result = Arc::clone(&shared)
                .supervise(ctx, child, token, panic_rx)
                .await;
            shared.hub.close();
            result
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[async_trait]
impl Transport for Recoverer {
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        let child = self
            .shared
            .current
            .read()
            .clone()
            .ok_or(TransportError::NotRunning)?;
        match AssertUnwindSafe(child.broadcast(topic, message))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                let _ = self.panic_tx.send(reason.clone());
                Err(TransportError::Panicked(reason))
            }
        }
    }

    fn messages(&self, topic: &str) -> Subscription {
        self.shared.hub.subscribe(topic)
    }
}
