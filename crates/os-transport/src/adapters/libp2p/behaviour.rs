//! Combined libp2p behaviour of the gossip transport.

use super::config::ValidatedConfig;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{allow_block_list, gossipsub, identify, identity, kad};
use std::time::Duration;

/// Identify protocol name advertised to peers.
pub const IDENTIFY_PROTOCOL: &str = "/oracle-suite/id/1.0.0";

/// Largest accepted gossip message.
pub const MAX_GOSSIP_SIZE: usize = 65_536;

/// Gossipsub for topic traffic, Kademlia for discovery, Identify to feed
/// Kademlia, and a block list. With discovery disabled Kademlia is off and
/// Identify keeps listen addresses to itself.
#[derive(NetworkBehaviour)]
pub struct OracleBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: Toggle<kad::Behaviour<kad::store::MemoryStore>>,
    pub identify: identify::Behaviour,
    pub blocked: allow_block_list::Behaviour<allow_block_list::BlockedPeers>,
}

pub fn build_behaviour(
    key: &identity::Keypair,
    config: &ValidatedConfig,
) -> Result<OracleBehaviour, Box<dyn std::error::Error + Send + Sync>> {
    let gossip_config = gossipsub::ConfigBuilder::default()
        .max_transmit_size(MAX_GOSSIP_SIZE)
        .heartbeat_interval(Duration::from_secs(1))
        .validate_messages()
        .build()?;
    let mut gossipsub =
        gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(key.clone()), gossip_config)?;
    for (peer, _) in &config.direct_peers {
        gossipsub.add_explicit_peer(peer);
    }

    let local_peer_id = key.public().to_peer_id();
    let kademlia = (!config.disable_discovery).then(|| {
        let mut kademlia = kad::Behaviour::new(local_peer_id, kad::store::MemoryStore::new(local_peer_id));
        kademlia.set_mode(Some(kad::Mode::Server));
        kademlia
    });

    let identify = identify::Behaviour::new(
        identify::Config::new(IDENTIFY_PROTOCOL.to_string(), key.public())
            .with_push_listen_addr_updates(false)
            .with_hide_listen_addrs(!config.advertises()),
    );

    let mut blocked = allow_block_list::Behaviour::default();
    for peer in &config.blocked_peers {
        blocked.block_peer(*peer);
    }

    Ok(OracleBehaviour {
        gossipsub,
        kademlia: Toggle::from(kademlia),
        identify,
        blocked,
    })
}
