//! # Ticker
//!
//! Periodic tick source shared by services that do work on a schedule.
//!
//! ## Cadence
//!
//! - [`Ticker::new`] fires every `d`.
//! - [`Ticker::new_var`] fires the k-th tick `d[min(k, n)]` after the
//!   previous one; the last duration repeats forever.
//!
//! Deadlines are cumulative from the moment the ticker starts, so a slow
//! consumer delays delivery but does not shift later deadlines. A zero
//! duration (or an empty list) disables automatic ticks; [`Ticker::tick`]
//! still works.
//!
//! Ticks travel over a capacity-1 channel. The producer waits until the
//! consumer accepts the tick or the ticker is cancelled.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A periodic tick source.
#[derive(Debug)]
pub struct Ticker {
    durations: Vec<Duration>,
    tx: mpsc::Sender<Instant>,
    rx: TickReceiver,
    ctx: OnceLock<CancellationToken>,
}

impl Ticker {
    /// Fixed cadence. `Duration::ZERO` disables automatic ticks.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self::new_var(&[duration])
    }

    /// Variable cadence; the last duration repeats.
    #[must_use]
    pub fn new_var(durations: &[Duration]) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            durations: durations.to_vec(),
            tx,
            rx: TickReceiver {
                inner: Arc::new(Mutex::new(rx)),
                ctx: Arc::new(OnceLock::new()),
            },
            ctx: OnceLock::new(),
        }
    }

    /// The first configured duration, or zero.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.durations.first().copied().unwrap_or_default()
    }

    /// Start emitting ticks until `ctx` is cancelled.
    ///
    /// # Panics
    ///
    /// When called more than once.
    pub fn start(&self, ctx: CancellationToken) {
        if self.ctx.set(ctx.clone()).is_err() {
            panic!("ticker already started");
        }
        let _ = self.rx.ctx.set(ctx.clone());

        if self.durations.is_empty() || self.durations.iter().any(Duration::is_zero) {
            return;
        }
        let durations = self.durations.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut deadline = Instant::now();
            for k in 0.. {
                deadline += durations[k.min(durations.len() - 1)];
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = sleep_until(deadline) => {}
                }
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    sent = tx.send(deadline) => if sent.is_err() { break },
                }
                trace!(tick = k, "Tick delivered");
            }
        });
    }

    /// Deliver a tick stamped with the current time.
    ///
    /// # Panics
    ///
    /// Before [`Ticker::start`] or after cancellation.
    pub async fn tick(&self) {
        self.tick_at(Instant::now()).await;
    }

    /// Deliver a tick stamped with `at`.
    ///
    /// # Panics
    ///
    /// Before [`Ticker::start`] or after cancellation.
    pub async fn tick_at(&self, at: Instant) {
        let Some(ctx) = self.ctx.get() else {
            panic!("ticker not started");
        };
        if ctx.is_cancelled() {
            panic!("ticker already stopped");
        }
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = self.tx.send(at) => {}
        }
    }

    /// The receiving side of the tick channel.
    #[must_use]
    pub fn tick_ch(&self) -> TickReceiver {
        self.rx.clone()
    }

    /// Shorthand for `tick_ch().recv()`.
    pub async fn recv(&self) -> Option<Instant> {
        self.rx.recv().await
    }
}

/// Receiving side of a [`Ticker`]. Clones share one channel.
#[derive(Debug, Clone)]
pub struct TickReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Instant>>>,
    ctx: Arc<OnceLock<CancellationToken>>,
}

impl TickReceiver {
    /// Next tick, or `None` once the ticker stopped.
    pub async fn recv(&self) -> Option<Instant> {
        let mut rx = self.inner.lock().await;
        match self.ctx.get() {
            Some(ctx) => tokio::select! {
                biased;
                _ = ctx.cancelled() => None,
                tick = rx.recv() => tick,
            },
            None => rx.recv().await,
        }
    }
}
