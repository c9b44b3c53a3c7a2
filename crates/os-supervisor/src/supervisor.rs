//! # Supervisor
//!
//! Starts a set of services as one unit and keeps them fail-fast:
//!
//! - services start in registration order; the first start failure cancels
//!   the ones already running and is returned;
//! - once running, the first service to finish with an error cancels the
//!   rest; `wait` returns that error and later ones are only logged;
//! - `stop` (or cancelling the parent token) shuts everything down.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use shared_types::{Lifecycle, Service, ServiceError};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Supervisor {
    lifecycle: Arc<Lifecycle>,
    services: Vec<Arc<dyn Service>>,
    ctx: OnceLock<CancellationToken>,
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new("supervisor")),
            services: Vec::new(),
            ctx: OnceLock::new(),
        }
    }

    /// Add a service. Services start in the order they were added.
    pub fn watch(&mut self, service: Arc<dyn Service>) -> &mut Self {
        self.services.push(service);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Cancel every supervised service. Idempotent.
    pub fn stop(&self) {
        if let Some(ctx) = self.ctx.get() {
            ctx.cancel();
        }
    }

    async fn abort_started(started: &[Arc<dyn Service>], ctx: &CancellationToken) {
        ctx.cancel();
        for service in started {
            if let Err(err) = service.wait().await {
                debug!(service = %service.name(), error = %err, "Service stopped with error during abort");
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for Supervisor {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let child = ctx.child_token();
        let _ = self.ctx.set(child.clone());

        for (index, service) in self.services.iter().enumerate() {
            debug!(service = %service.name(), "Starting service");
            if let Err(err) = service.start(child.clone()).await {
                error!(service = %service.name(), error = %err, "Failed to start service");
                Self::abort_started(&self.services[..index], &child).await;
                self.lifecycle.finish(Err(err.clone()));
                return Err(err);
            }
        }
        info!(services = self.services.len(), "All services started");

        let services = self.services.clone();
        let task = tokio::spawn(async move {
            let mut pending: FuturesUnordered<_> = services
                .iter()
                .map(|service| {
                    let service = Arc::clone(service);
                    async move {
                        let result = service.wait().await;
                        (service, result)
                    }
                })
                .collect();

            let mut first_error = None;
            while let Some((service, result)) = pending.next().await {
                match result {
                    Ok(()) => debug!(service = %service.name(), "Service finished"),
                    Err(err) if first_error.is_none() => {
                        error!(service = %service.name(), error = %err, "Service failed, stopping the rest");
                        child.cancel();
                        first_error = Some(err);
                    }
                    Err(err) => {
                        warn!(service = %service.name(), error = %err, "Service failed during shutdown");
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}
