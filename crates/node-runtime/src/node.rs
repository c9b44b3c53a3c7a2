//! # Node Wiring
//!
//! Builds the services described by a [`Config`] and runs them under one
//! [`Supervisor`]:
//!
//! 1. signing keys from the `ethereum` block
//! 2. transports from the `transport` block, each behind a recoverer
//! 3. the ghost service on top of the transport
//! 4. the morph engine, if configured, feeding the ghost service

use crate::config::{Config, DEFAULT_CONFIG};
use crate::ghost::GhostService;
use anyhow::{Context, Result};
use os_morph::Morph;
use os_supervisor::Supervisor;
use os_transport::{as_service, RecoveryPolicy, Transport, TransportDeps};
use shared_crypto::Signer;
use shared_types::{default_topics, Service};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Node {
    transport: Arc<dyn Transport>,
    ghost: Arc<GhostService>,
    morph: Option<Arc<Morph<Config>>>,
}

impl Node {
    /// Construct every service. Nothing is started yet.
    pub fn build(config: &Config) -> Result<Self> {
        let keys = config
            .ethereum
            .key_registry()
            .context("invalid ethereum keys")?;
        if let Some(name) = &config.ghost.ethereum_key {
            let signer = keys.get(name).context("invalid ghost.ethereum_key")?;
            info!(key = %name, address = %signer.address(), "Ghost signing key");
        }

        let transport = config
            .transport
            .build(&TransportDeps {
                keys: &keys,
                clients: &config.ethereum.client,
                topics: default_topics(),
                policy: RecoveryPolicy::default(),
            })
            .context("failed to build transport")?;

        let ghost = Arc::new(
            GhostService::new(config.ghost.clone(), Arc::clone(&transport))
                .context("invalid ghost configuration")?,
        );

        let morph = match &config.morph {
            Some(morph_config) => {
                let morph = Morph::<Config>::new(morph_config.clone(), vec![DEFAULT_CONFIG])
                    .context("invalid morph configuration")?;
                morph.register("ghost", Arc::clone(&ghost), |c: &Config| c.ghost.clone());
                Some(Arc::new(morph))
            }
            None => None,
        };

        Ok(Self {
            transport,
            ghost,
            morph,
        })
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    #[must_use]
    pub fn ghost(&self) -> Arc<GhostService> {
        Arc::clone(&self.ghost)
    }

    /// Start every service and block until they stop.
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let mut supervisor = Supervisor::new();
        supervisor.watch(as_service(Arc::clone(&self.transport)));
        supervisor.watch(self.ghost.clone());
        if let Some(morph) = &self.morph {
            supervisor.watch(morph.clone());
        }

        supervisor
            .start(ctx)
            .await
            .context("failed to start services")?;
        info!(services = supervisor.len(), "Node started");
        supervisor.wait().await.context("service failed")?;
        info!("Node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use os_config::{EnvSource, Loader};
    use std::collections::BTreeMap;

    fn embedded(vars: &[(&str, &str)]) -> Config {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Loader::new(EnvSource::isolated(vars))
            .load_embeds::<Config>(&[DEFAULT_CONFIG])
            .unwrap()
            .config
    }

    #[tokio::test]
    async fn test_embedded_config_runs_and_stops() {
        let config = embedded(&[("GHOST_LISTEN_ADDR", "/ip4/127.0.0.1/tcp/0")]);
        let node = Node::build(&config).unwrap();
        let ctx = CancellationToken::new();
        let run = tokio::spawn(node.run(ctx.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        ctx.cancel();
        run.await.unwrap().unwrap();
    }

    #[test]
    fn test_unknown_ghost_key_fails() {
        let mut config = embedded(&[]);
        config.ghost.ethereum_key = Some("missing".to_string());
        let err = Node::build(&config).err().unwrap();
        assert!(err.to_string().contains("ghost.ethereum_key"));
    }

    #[test]
    fn test_no_transport_fails() {
        let mut config = embedded(&[]);
        config.transport = Default::default();
        assert!(Node::build(&config).is_err());
    }
}
