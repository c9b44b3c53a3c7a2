//! # Service Lifecycle
//!
//! Every long-running component (transports, the morph engine, the
//! supervisor) implements [`Service`]:
//!
//! - `start(ctx)` brings the service up and returns once it is running.
//!   Stopping is driven by cancelling `ctx`; there is no explicit stop call.
//! - `wait()` resolves when the service has fully stopped and yields its
//!   final result. Any number of callers may wait.
//!
//! [`Lifecycle`] holds the bookkeeping most implementations share: the
//! single-start guard and the completion slot.

use crate::errors::ServiceError;
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A component started once and stopped through cancellation.
#[async_trait]
pub trait Service: Send + Sync {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Start the service. Returns `AlreadyStarted` on a second call.
    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError>;

    /// Resolve once the service has stopped.
    async fn wait(&self) -> Result<(), ServiceError>;
}

/// Start guard and completion slot of a service.
#[derive(Debug)]
pub struct Lifecycle {
    name: String,
    started: AtomicBool,
    done: watch::Sender<Option<Result<(), ServiceError>>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            name: name.into(),
            started: AtomicBool::new(false),
            done,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark the service as started. Fails if it already was.
    pub fn begin(&self) -> Result<(), ServiceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStarted {
                service: self.name.clone(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Record the final result. Only the first call has an effect.
    pub fn finish(&self, result: Result<(), ServiceError>) {
        let recorded = self.done.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        });
        if recorded {
            debug!(service = %self.name, "Service stopped");
        }
    }

    /// Wait for the final result.
    pub async fn wait(&self) -> Result<(), ServiceError> {
        if !self.is_started() {
            return Err(ServiceError::NotStarted {
                service: self.name.clone(),
            });
        }
        let mut rx = self.done.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    /// Finish the lifecycle with the outcome of a spawned task.
    ///
    /// A panic inside the task becomes [`ServiceError::Panicked`].
    pub fn finish_with(
        self: &Arc<Self>,
        task: JoinHandle<Result<(), ServiceError>>,
    ) -> JoinHandle<()> {
        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(err) => Err(lifecycle.join_error(err)),
            };
            lifecycle.finish(result);
        })
    }

    /// Convert a task join failure into a service error.
    #[must_use]
    pub fn join_error(&self, err: JoinError) -> ServiceError {
        if err.is_panic() {
            ServiceError::Panicked {
                service: self.name.clone(),
                reason: panic_message(err.into_panic().as_ref()),
            }
        } else {
            ServiceError::runtime(self.name.clone(), "task cancelled")
        }
    }
}

/// Best-effort rendering of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn explode() -> Result<(), ServiceError> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_begin_only_once() {
        let lc = Lifecycle::new("svc");
        assert!(lc.begin().is_ok());
        assert_eq!(
            lc.begin(),
            Err(ServiceError::AlreadyStarted {
                service: "svc".into()
            })
        );
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        let lc = Lifecycle::new("svc");
        assert!(matches!(
            lc.wait().await,
            Err(ServiceError::NotStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_first_finish_wins_and_all_waiters_see_it() {
        let lc = Arc::new(Lifecycle::new("svc"));
        lc.begin().unwrap();

        let waiter = {
            let lc = Arc::clone(&lc);
            tokio::spawn(async move { lc.wait().await })
        };

        lc.finish(Err(ServiceError::runtime("svc", "first")));
        lc.finish(Ok(()));

        assert_eq!(
            waiter.await.unwrap(),
            Err(ServiceError::runtime("svc", "first"))
        );
        assert_eq!(lc.wait().await, Err(ServiceError::runtime("svc", "first")));
        assert!(lc.is_finished());
    }

    #[tokio::test]
    async fn test_finish_with_maps_panics() {
        let lc = Arc::new(Lifecycle::new("svc"));
        lc.begin().unwrap();
        let task = tokio::spawn(explode());
        lc.finish_with(task).await.unwrap();

        match lc.wait().await {
            Err(ServiceError::Panicked { reason, .. }) => assert_eq!(reason, "kaboom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_finish_with_passes_result_through() {
        let lc = Arc::new(Lifecycle::new("svc"));
        lc.begin().unwrap();
        let task = tokio::spawn(async { Ok(()) });
        lc.finish_with(task).await.unwrap();
        assert_eq!(lc.wait().await, Ok(()));
    }
}
