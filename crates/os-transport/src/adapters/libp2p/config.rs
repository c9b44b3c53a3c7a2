//! Gossip transport configuration and its validation.

use crate::domain::AllowList;
use crate::errors::TransportError;
use libp2p::multiaddr::Protocol;
use libp2p::{identity, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use shared_crypto::Ed25519Seed;
use shared_types::Address;
use std::collections::HashSet;
use std::net::IpAddr;

/// Role of a gossip node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Libp2pMode {
    /// Subscribes topics and exchanges messages.
    #[default]
    Client,
    /// Discovery relay only; carries no topic traffic.
    Bootstrap,
}

/// The `transport.libp2p` config block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Libp2pConfig {
    pub listen_addrs: Vec<String>,
    pub external_ip: Option<String>,
    pub bootstrap_addrs: Vec<String>,
    pub direct_peers_addrs: Vec<String>,
    pub blocked_addrs: Vec<String>,
    pub disable_discovery: bool,
    pub feeds: Vec<Address>,
    pub feeds_filter_disable: bool,
    /// Hex-encoded 32-byte seed; empty for a random identity.
    pub priv_key_seed: String,
    /// Name of the signing key in the key registry.
    pub ethereum_key: Option<String>,
}

/// A config that passed validation, with every address parsed.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub keypair: identity::Keypair,
    pub listen_addrs: Vec<Multiaddr>,
    /// Public address built from `external_ip` and the first TCP listen port.
    pub external_addr: Option<Multiaddr>,
    pub bootstrap_addrs: Vec<Multiaddr>,
    pub direct_peers: Vec<(PeerId, Multiaddr)>,
    pub blocked_peers: Vec<PeerId>,
    pub blocked_ips: HashSet<IpAddr>,
    pub disable_discovery: bool,
    pub allow: AllowList,
}

impl ValidatedConfig {
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// Whether peers learn this node's addresses. Off with discovery.
    #[must_use]
    pub fn advertises(&self) -> bool {
        !self.disable_discovery
    }

    /// External address announced to peers, if any.
    #[must_use]
    pub fn advertised_addr(&self) -> Option<&Multiaddr> {
        self.external_addr.as_ref().filter(|_| self.advertises())
    }
}

fn invalid(reason: impl Into<String>) -> TransportError {
    TransportError::Validation(reason.into())
}

fn parse_addr(raw: &str, field: &str) -> Result<Multiaddr, TransportError> {
    raw.parse()
        .map_err(|e| invalid(format!("{field}: invalid multiaddr {raw:?}: {e}")))
}

fn peer_of(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer) => Some(peer),
        _ => None,
    })
}

fn ip_of(addr: &Multiaddr) -> Option<IpAddr> {
    addr.iter().find_map(|p| match p {
        Protocol::Ip4(ip) => Some(IpAddr::V4(ip)),
        Protocol::Ip6(ip) => Some(IpAddr::V6(ip)),
        _ => None,
    })
}

fn tcp_port_of(addr: &Multiaddr) -> Option<u16> {
    addr.iter().find_map(|p| match p {
        Protocol::Tcp(port) => Some(port),
        _ => None,
    })
}

/// Overlay identity from a hex seed; random when the seed is empty.
pub fn keypair_from_seed(seed: &str) -> Result<identity::Keypair, TransportError> {
    if seed.trim().is_empty() {
        return Ok(identity::Keypair::generate_ed25519());
    }
    let seed = Ed25519Seed::from_hex(seed).map_err(|e| invalid(format!("priv_key_seed: {e}")))?;
    identity::Keypair::ed25519_from_bytes(seed.to_bytes())
        .map_err(|e| invalid(format!("priv_key_seed: {e}")))
}

impl Libp2pConfig {
    /// Check every constraint and parse addresses.
    pub fn validate(&self) -> Result<ValidatedConfig, TransportError> {
        let mut listen_addrs = Vec::with_capacity(self.listen_addrs.len());
        for raw in &self.listen_addrs {
            let addr = parse_addr(raw, "listen_addrs")?;
            if listen_addrs.contains(&addr) {
                return Err(invalid(format!("duplicate listen address {raw}")));
            }
            listen_addrs.push(addr);
        }

        let mut external_addr = None;
        if let Some(raw) = self.external_ip.as_deref().filter(|s| !s.is_empty()) {
            let ip: IpAddr = raw
                .parse()
                .map_err(|e| invalid(format!("external_ip: invalid IP {raw:?}: {e}")))?;
            if listen_addrs.iter().any(|a| ip_of(a) == Some(ip)) {
                return Err(invalid("external IP already configured as listen address"));
            }
            let port = listen_addrs.iter().find_map(tcp_port_of).ok_or_else(|| {
                invalid("external_ip requires at least one listen address with a TCP port")
            })?;
            let mut external = Multiaddr::empty().with(match ip {
                IpAddr::V4(v4) => Protocol::Ip4(v4),
                IpAddr::V6(v6) => Protocol::Ip6(v6),
            });
            external.push(Protocol::Tcp(port));
            external_addr = Some(external);
        }

        let bootstrap_addrs = self
            .bootstrap_addrs
            .iter()
            .map(|raw| parse_addr(raw, "bootstrap_addrs"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut direct_peers = Vec::with_capacity(self.direct_peers_addrs.len());
        for raw in &self.direct_peers_addrs {
            let addr = parse_addr(raw, "direct_peers_addrs")?;
            let peer = peer_of(&addr)
                .ok_or_else(|| invalid(format!("direct peer address {raw} has no /p2p/ component")))?;
            direct_peers.push((peer, addr));
        }
        if self.disable_discovery && direct_peers.is_empty() {
            return Err(invalid(
                "disable_discovery requires at least one direct peer address",
            ));
        }

        let mut blocked_peers = Vec::new();
        let mut blocked_ips = HashSet::new();
        for raw in &self.blocked_addrs {
            let addr = parse_addr(raw, "blocked_addrs")?;
            if let Some(peer) = peer_of(&addr) {
                blocked_peers.push(peer);
            }
            if let Some(ip) = ip_of(&addr) {
                blocked_ips.insert(ip);
            }
        }

        Ok(ValidatedConfig {
            keypair: keypair_from_seed(&self.priv_key_seed)?,
            listen_addrs,
            external_addr,
            bootstrap_addrs,
            direct_peers,
            blocked_peers,
            blocked_ips,
            disable_discovery: self.disable_discovery,
            allow: AllowList::new(self.feeds.iter().copied(), self.feeds_filter_disable),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_SEED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    fn config() -> Libp2pConfig {
        Libp2pConfig {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/8000".into()],
            ..Libp2pConfig::default()
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = keypair_from_seed(ZERO_SEED).unwrap();
        let b = keypair_from_seed(ZERO_SEED).unwrap();
        assert_eq!(a.public().to_peer_id(), b.public().to_peer_id());
    }

    #[test]
    fn test_empty_seed_is_random() {
        let a = keypair_from_seed("").unwrap();
        let b = keypair_from_seed("").unwrap();
        assert_ne!(a.public().to_peer_id(), b.public().to_peer_id());
    }

    #[test]
    fn test_short_seed_rejected() {
        let short = &ZERO_SEED[..62];
        assert!(matches!(
            keypair_from_seed(short),
            Err(TransportError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_listen_address() {
        let cfg = Libp2pConfig {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/1".into(), "/ip4/0.0.0.0/tcp/1".into()],
            ..config()
        };
        assert!(matches!(cfg.validate(), Err(TransportError::Validation(r)) if r.contains("duplicate")));
    }

    #[test]
    fn test_external_ip_collides_with_listen_ip() {
        let cfg = Libp2pConfig {
            listen_addrs: vec!["/ip4/1.2.3.4/tcp/0".into()],
            external_ip: Some("1.2.3.4".into()),
            ..config()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            TransportError::Validation("external IP already configured as listen address".into())
        );
    }

    #[test]
    fn test_external_ip_uses_first_tcp_port() {
        let cfg = Libp2pConfig {
            listen_addrs: vec![
                "/ip4/0.0.0.0/udp/7000".into(),
                "/ip4/0.0.0.0/tcp/8000".into(),
                "/ip4/0.0.0.0/tcp/8001".into(),
            ],
            external_ip: Some("5.6.7.8".into()),
            ..config()
        };
        let validated = cfg.validate().unwrap();
        assert_eq!(
            validated.external_addr,
            Some("/ip4/5.6.7.8/tcp/8000".parse::<Multiaddr>().unwrap())
        );
        assert_eq!(validated.advertised_addr(), validated.external_addr.as_ref());
    }

    #[test]
    fn test_disabled_discovery_advertises_nothing() {
        let peer = identity::Keypair::generate_ed25519().public().to_peer_id();
        let cfg = Libp2pConfig {
            external_ip: Some("5.6.7.8".into()),
            disable_discovery: true,
            direct_peers_addrs: vec![format!("/ip4/10.0.0.1/tcp/8000/p2p/{peer}")],
            ..config()
        };
        let validated = cfg.validate().unwrap();
        assert!(validated.external_addr.is_some());
        assert!(!validated.advertises());
        assert_eq!(validated.advertised_addr(), None);
    }

    #[test]
    fn test_external_ip_requires_tcp_listen() {
        let cfg = Libp2pConfig {
            listen_addrs: vec!["/ip4/0.0.0.0/udp/9000".into()],
            external_ip: Some("5.6.7.8".into()),
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_disable_discovery_requires_direct_peers() {
        let cfg = Libp2pConfig {
            disable_discovery: true,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_direct_peer_requires_peer_id() {
        let cfg = Libp2pConfig {
            direct_peers_addrs: vec!["/ip4/10.0.0.1/tcp/8000".into()],
            ..config()
        };
        assert!(cfg.validate().is_err());

        let peer = identity::Keypair::generate_ed25519().public().to_peer_id();
        let cfg = Libp2pConfig {
            direct_peers_addrs: vec![format!("/ip4/10.0.0.1/tcp/8000/p2p/{peer}")],
            disable_discovery: true,
            ..config()
        };
        let validated = cfg.validate().unwrap();
        assert_eq!(validated.direct_peers[0].0, peer);
    }

    #[test]
    fn test_blocked_addrs_split() {
        let peer = identity::Keypair::generate_ed25519().public().to_peer_id();
        let cfg = Libp2pConfig {
            blocked_addrs: vec![
                "/ip4/9.9.9.9/tcp/1".into(),
                format!("/ip4/8.8.8.8/tcp/1/p2p/{peer}"),
            ],
            ..config()
        };
        let validated = cfg.validate().unwrap();
        assert_eq!(validated.blocked_peers, vec![peer]);
        assert_eq!(validated.blocked_ips.len(), 2);
    }
}
