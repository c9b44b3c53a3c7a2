//! # Ghost Service
//!
//! Announces the node's data models on the `greet/v1` topic at a fixed
//! interval. The model list follows morph reloads: every update swaps in a
//! new snapshot, picked up by the next broadcast.

use crate::config::GhostConfig;
use async_trait::async_trait;
use os_morph::Reloadable;
use os_supervisor::Ticker;
use os_telemetry::log_event;
use os_transport::Transport;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{Lifecycle, Message, Service, ServiceError, TOPIC_GREET};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SUBSYSTEM: &str = "ghost";

/// Body of a `greet/v1` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub data_models: Vec<String>,
    pub version: u64,
}

struct State {
    config: GhostConfig,
    version: u64,
}

pub struct GhostService {
    lifecycle: Arc<Lifecycle>,
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<State>>,
}

impl GhostService {
    pub fn new(config: GhostConfig, transport: Arc<dyn Transport>) -> Result<Self, ServiceError> {
        validate(&config)?;
        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(SUBSYSTEM)),
            transport,
            state: Arc::new(RwLock::new(State { config, version: 0 })),
        })
    }

    /// The models announced by the next broadcast.
    #[must_use]
    pub fn data_models(&self) -> Vec<String> {
        self.state.read().config.data_models.clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

fn validate(config: &GhostConfig) -> Result<(), ServiceError> {
    if config.interval == 0 {
        return Err(ServiceError::validation(SUBSYSTEM, "interval must be positive"));
    }
    Ok(())
}

async fn announce(transport: &dyn Transport, state: &RwLock<State>) {
    let greeting = {
        let state = state.read();
        Greeting {
            data_models: state.config.data_models.clone(),
            version: state.version,
        }
    };
    let body = match serde_json::to_vec(&greeting) {
        Ok(body) => body,
        Err(err) => {
            log_event!(error, SUBSYSTEM, "Failed to encode greeting", error = %err);
            return;
        }
    };
    match transport.broadcast(TOPIC_GREET, Message::new(body)).await {
        Ok(()) => log_event!(
            debug,
            SUBSYSTEM,
            "Greeting sent",
            models = greeting.data_models.len(),
            version = greeting.version
        ),
        Err(err) => log_event!(warn, SUBSYSTEM, "Greeting not sent", error = %err),
    }
}

#[async_trait]
impl Service for GhostService {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let interval = Duration::from_secs(self.state.read().config.interval);
        let ticker = Ticker::new(interval);
        ticker.start(ctx);

        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            while ticker.recv().await.is_some() {
                announce(transport.as_ref(), &state).await;
            }
            Ok(())
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

impl Reloadable<GhostConfig> for GhostService {
    /// The broadcast interval is fixed at start; only the model list and
    /// version take effect.
    fn update_config(&self, config: GhostConfig, version: u64) -> Result<(), ServiceError> {
        validate(&config)?;
        let mut state = self.state.write();
        log_event!(
            info,
            SUBSYSTEM,
            "Data models updated",
            models = config.data_models.len(),
            version
        );
        *state = State { config, version };
        Ok(())
    }
}
