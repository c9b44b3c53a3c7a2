//! # Gossip Transport
//!
//! libp2p overlay: gossipsub carries topic traffic, Kademlia and Identify
//! discover peers, and a block list keeps unwanted peers out.
//!
//! ## Lifecycle
//!
//! `Uninitialized → Running → Stopped`. [`Libp2pTransport::new`] validates
//! the config and derives the overlay identity; `start` builds the swarm,
//! binds listeners and spawns the event loop. Cancelling the context stops
//! the loop and drops the swarm.
//!
//! ## Messages
//!
//! Outgoing: sealed with the configured key, bincode-encoded, published
//! through the event loop; publish errors come back to the caller.
//! Incoming: decoded, checked by the [`InboundFilter`], reported to
//! gossipsub as Accept/Reject/Ignore, then fanned out per topic.

mod behaviour;
mod config;

pub use behaviour::{OracleBehaviour, IDENTIFY_PROTOCOL, MAX_GOSSIP_SIZE};
pub use config::{keypair_from_seed, Libp2pConfig, Libp2pMode, ValidatedConfig};

use crate::domain::{InboundFilter, Rejection, Sealer, TopicHub};
use crate::errors::TransportError;
use crate::ports::{Subscription, Transport};
use async_trait::async_trait;
use behaviour::{build_behaviour, OracleBehaviourEvent};
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, MessageAcceptance};
use libp2p::swarm::SwarmEvent;
use libp2p::multiaddr::Protocol;
use libp2p::{identify, noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use parking_lot::{Mutex, RwLock};
use shared_crypto::Signer;
use shared_types::{Envelope, Lifecycle, Message, ReceivedMessage, Service, ServiceError, TopicSet};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const SUBSYSTEM: &str = "libp2p";

/// How long idle connections stay open.
pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

enum Command {
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

pub struct Libp2pTransport {
    lifecycle: Arc<Lifecycle>,
    mode: Libp2pMode,
    peer_id: PeerId,
    sealer: Sealer,
    filter: InboundFilter,
    hub: Arc<TopicHub>,
    pending: Mutex<Option<ValidatedConfig>>,
    commands: RwLock<Option<mpsc::Sender<Command>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl Libp2pTransport {
    /// Validate `config` and derive the overlay identity.
    ///
    /// Bootstrap nodes carry no topics.
    pub fn new(
        config: &Libp2pConfig,
        mode: Libp2pMode,
        signer: Option<Arc<dyn Signer>>,
        topics: TopicSet,
    ) -> Result<Self, TransportError> {
        let validated = config.validate()?;
        let topics = match mode {
            Libp2pMode::Client => topics,
            Libp2pMode::Bootstrap => TopicSet::new(),
        };
        let sealer = Sealer::new(signer, topics.clone());
        let allow = Arc::new(validated.allow.clone().with_signer(sealer.address()));
        let peer_id = validated.peer_id();
        info!(peer_id = %peer_id, mode = ?mode, "Gossip identity ready");

        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(SUBSYSTEM)),
            mode,
            peer_id,
            hub: Arc::new(TopicHub::new(&topics)),
            filter: InboundFilter::new(topics, allow),
            sealer,
            pending: Mutex::new(Some(validated)),
            commands: RwLock::new(None),
            listen_addrs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    #[must_use]
    pub fn mode(&self) -> Libp2pMode {
        self.mode
    }

    /// Addresses the swarm is listening on, once bound.
    #[must_use]
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().clone()
    }

    fn prepare(&self) -> Result<(ValidatedConfig, Swarm<OracleBehaviour>), TransportError> {
        let config = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| TransportError::Construction("config already consumed".into()))?;
        let swarm = self.build_swarm(&config)?;
        Ok((config, swarm))
    }

    fn build_swarm(&self, config: &ValidatedConfig) -> Result<Swarm<OracleBehaviour>, TransportError> {
        let construction = |e: &dyn std::fmt::Display| TransportError::Construction(e.to_string());
        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(config.keypair.clone())
            .with_tokio()
            .with_tcp(tcp::Config::default().nodelay(true), noise::Config::new, yamux::Config::default)
            .map_err(|e| construction(&e))?
            .with_behaviour(|key| build_behaviour(key, config))
            .map_err(|e| construction(&e))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        for addr in &config.listen_addrs {
            swarm.listen_on(addr.clone()).map_err(|e| construction(&e))?;
        }
        if let Some(addr) = config.advertised_addr() {
            swarm.add_external_address(addr.clone());
        }
        for topic in self.filter.topics().names() {
            swarm
                .behaviour_mut()
                .gossipsub
                .subscribe(&IdentTopic::new(topic))
                .map_err(|e| construction(&e))?;
        }
        if let Some(kademlia) = swarm.behaviour_mut().kademlia.as_mut() {
            for addr in &config.bootstrap_addrs {
                if let Some(peer) = peer_in(addr) {
                    kademlia.add_address(&peer, addr.clone());
                }
            }
        }
        for addr in config
            .bootstrap_addrs
            .iter()
            .chain(config.direct_peers.iter().map(|(_, addr)| addr))
        {
            if let Err(err) = swarm.dial(addr.clone()) {
                warn!(addr = %addr, error = %err, "Failed to dial peer");
            }
        }
        if !config.bootstrap_addrs.is_empty() {
            if let Some(kademlia) = swarm.behaviour_mut().kademlia.as_mut() {
                if let Err(err) = kademlia.bootstrap() {
                    debug!(error = %err, "Kademlia bootstrap not started");
                }
            }
        }
        Ok(swarm)
    }
}

fn peer_in(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer) => Some(peer),
        _ => None,
    })
}

#[async_trait]
impl Service for Libp2pTransport {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let (config, swarm) = match self.prepare() {
            Ok(built) => built,
            Err(err) => {
                let err = err.into_service(self.name());
                self.lifecycle.finish(Err(err.clone()));
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel(64);
        *self.commands.write() = Some(tx);

        let event_loop = EventLoop {
            swarm,
            commands: rx,
            filter: self.filter.clone(),
            hub: Arc::clone(&self.hub),
            blocked_ips: config.blocked_ips,
            listen_addrs: Arc::clone(&self.listen_addrs),
        };
        let task = tokio::spawn(event_loop.run(ctx));
        self.lifecycle.finish_with(task);
        info!(peer_id = %self.peer_id, "Gossip transport started");
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[async_trait]
impl Transport for Libp2pTransport {
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        let envelope = self.sealer.seal(topic, message)?;
        let data = envelope.to_wire()?;
        let commands = self.commands.read().clone().ok_or(TransportError::NotRunning)?;
        let (reply, response) = oneshot::channel();
        commands
            .send(Command::Publish {
                topic: topic.to_string(),
                data,
                reply,
            })
            .await
            .map_err(|_| TransportError::NotRunning)?;
        response.await.map_err(|_| TransportError::NotRunning)?
    }

    fn messages(&self, topic: &str) -> Subscription {
        self.hub.subscribe(topic)
    }
}

// =============================================================================
// Event loop
// =============================================================================

struct EventLoop {
    swarm: Swarm<OracleBehaviour>,
    commands: mpsc::Receiver<Command>,
    filter: InboundFilter,
    hub: Arc<TopicHub>,
    blocked_ips: HashSet<IpAddr>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl EventLoop {
    async fn run(mut self, ctx: CancellationToken) -> Result<(), ServiceError> {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command),
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }
        self.hub.close();
        debug!("Gossip event loop stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(IdentTopic::new(topic.as_str()), data)
                    .map(|_| ())
                    .map_err(|e| TransportError::Publish(e.to_string()));
                let _ = reply.send(result);
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<OracleBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(address = %address, "Listening");
                self.listen_addrs.write().push(address);
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                let remote = endpoint.get_remote_address();
                if self.is_blocked_ip(remote) {
                    debug!(peer_id = %peer_id, addr = %remote, "Disconnecting blocked address");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    return;
                }
                debug!(peer_id = %peer_id, addr = %remote, "Connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                trace!(peer_id = %peer_id, "Connection closed");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(peer_id = ?peer_id, error = %error, "Outgoing connection failed");
            }
            SwarmEvent::Behaviour(OracleBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message_id,
                message,
                ..
            })) => {
                let acceptance = self.accept(propagation_source, &message);
                let _ = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .report_message_validation_result(&message_id, &propagation_source, acceptance);
            }
            SwarmEvent::Behaviour(OracleBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                if let Some(kademlia) = self.swarm.behaviour_mut().kademlia.as_mut() {
                    for addr in info.listen_addrs {
                        kademlia.add_address(&peer_id, addr);
                    }
                }
            }
            other => trace!(event = ?other, "Unhandled swarm event"),
        }
    }

    fn is_blocked_ip(&self, addr: &Multiaddr) -> bool {
        addr.iter().any(|p| match p {
            Protocol::Ip4(ip) => self.blocked_ips.contains(&IpAddr::from(ip)),
            Protocol::Ip6(ip) => self.blocked_ips.contains(&IpAddr::from(ip)),
            _ => false,
        })
    }

    fn accept(&self, source: PeerId, message: &gossipsub::Message) -> MessageAcceptance {
        let envelope = match Envelope::from_wire(&message.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(peer_id = %source, error = %err, "Dropping undecodable message");
                return MessageAcceptance::Reject;
            }
        };
        if envelope.topic != message.topic.as_str() {
            debug!(peer_id = %source, topic = %envelope.topic, "Envelope topic does not match gossip topic");
            return MessageAcceptance::Reject;
        }
        match self.filter.check(&envelope) {
            Ok(()) => {
                self.hub.publish(ReceivedMessage::new(envelope, source.to_string()));
                MessageAcceptance::Accept
            }
            Err(Rejection::NotAllowed(author)) => {
                debug!(peer_id = %source, author = %author, "Dropping message from unlisted feed");
                MessageAcceptance::Ignore
            }
            Err(rejection) => {
                debug!(peer_id = %source, %rejection, "Dropping invalid message");
                MessageAcceptance::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::EthereumKey;
    use shared_types::{default_topics, TOPIC_PRICE};

    const ZERO_SEED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    fn local_config() -> Libp2pConfig {
        Libp2pConfig {
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".into()],
            priv_key_seed: ZERO_SEED.into(),
            ..Libp2pConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_identity() {
        let a = Libp2pTransport::new(&local_config(), Libp2pMode::Client, None, default_topics()).unwrap();
        let b = Libp2pTransport::new(&local_config(), Libp2pMode::Client, None, default_topics()).unwrap();
        assert_eq!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn test_seed_length_mismatch() {
        let config = Libp2pConfig {
            priv_key_seed: ZERO_SEED[..62].into(),
            ..local_config()
        };
        assert!(matches!(
            Libp2pTransport::new(&config, Libp2pMode::Client, None, default_topics()),
            Err(TransportError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_topics() {
        let key: Arc<dyn Signer> = Arc::new(EthereumKey::generate());
        let transport =
            Libp2pTransport::new(&local_config(), Libp2pMode::Bootstrap, Some(key), default_topics()).unwrap();
        assert_eq!(
            transport.broadcast(TOPIC_PRICE, Message::new("1")).await,
            Err(TransportError::TopicNotSupported(TOPIC_PRICE.into()))
        );
        assert!(transport.messages(TOPIC_PRICE).recv().await.is_none());
    }

    #[tokio::test]
    async fn test_start_binds_and_stops() {
        let transport = Libp2pTransport::new(&local_config(), Libp2pMode::Client, None, default_topics()).unwrap();
        let ctx = CancellationToken::new();
        transport.start(ctx.clone()).await.unwrap();
        assert!(matches!(
            transport.start(ctx.clone()).await,
            Err(ServiceError::AlreadyStarted { .. })
        ));

        let mut sub = transport.messages(TOPIC_PRICE);
        ctx.cancel();
        transport.wait().await.unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_before_start() {
        let key: Arc<dyn Signer> = Arc::new(EthereumKey::generate());
        let transport =
            Libp2pTransport::new(&local_config(), Libp2pMode::Client, Some(key), default_topics()).unwrap();
        assert_eq!(
            transport.broadcast(TOPIC_PRICE, Message::new("1")).await,
            Err(TransportError::NotRunning)
        );
    }
}
