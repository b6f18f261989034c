//! The periodic reconcile loop.
//!
//! One task, one tick at a time. Stop requests are only honoured between
//! ticks: a tick that has started always runs to completion.

use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use vck_core::CustomResource;

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;

/// Handle used to stop a running loop.
#[derive(Debug)]
pub struct LoopStopper {
    tx: watch::Sender<bool>,
}

/// Receiving side of a [`LoopStopper`], handed to [`Reconciler::run`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl LoopStopper {
    /// Create a stopper and the signal it controls.
    pub fn new() -> (Self, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, StopSignal { rx })
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop has been requested. If every stopper is dropped
    /// without stopping, never resolves.
    pub async fn stopped(&mut self) {
        let fired = self.rx.wait_for(|stopped| *stopped).await.is_ok();
        if !fired {
            future::pending::<()>().await;
        }
    }
}

impl<R: CustomResource> Reconciler<R> {
    /// Reconcile every `interval` until `signal` fires.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// pushes the schedule back rather than bursting to catch up.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero interval. Tick failures are logged
    /// and never end the loop.
    pub async fn run(&self, mut signal: StopSignal, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::invalid_config("Reconcile interval must be non-zero"));
        }

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            namespace = self.namespace(),
            target = %self.target(),
            interval_secs = interval.as_secs_f64(),
            "Starting reconcile loop"
        );

        loop {
            tokio::select! {
                biased;
                () = signal.stopped() => break,
                _ = ticker.tick() => {
                    let report = self.reconcile_once().await;
                    for error in &report.errors {
                        warn!(error = %error, "Reconcile error");
                    }
                }
            }
        }

        info!(ticks = self.ticks(), "Reconcile loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use super::*;
    use crate::memory::InMemoryStore;
    use vck_core::VolumeManager;

    fn reconciler() -> Arc<Reconciler<VolumeManager>> {
        let store = Arc::new(InMemoryStore::volume_managers());
        Arc::new(Reconciler::<VolumeManager>::new("default", VolumeManager::gvk(), store, Vec::new()))
    }

    #[tokio::test]
    async fn test_stopper_signals() {
        let (stopper, mut signal) = LoopStopper::new();
        assert!(!signal.is_stopped());
        stopper.stop();
        stopper.stop();
        assert!(signal.is_stopped());
        assert!(stopper.is_stopped());
        signal.stopped().await;
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (_stopper, signal) = LoopStopper::new();
        let result = reconciler().run(signal, Duration::ZERO).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_stopped() {
        let reconciler = reconciler();
        let (stopper, signal) = LoopStopper::new();

        let handle = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.run(signal, Duration::from_secs(10)).await }
        });

        time::sleep(Duration::from_secs(25)).await;
        stopper.stop();
        handle.await.unwrap().unwrap();

        // Immediate first tick, then at 10s and 20s.
        assert_eq!(reconciler.ticks(), 3);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_no_tick() {
        let reconciler = reconciler();
        let (stopper, signal) = LoopStopper::new();
        stopper.stop();

        reconciler.run(signal, Duration::from_secs(1)).await.unwrap();
        assert_eq!(reconciler.ticks(), 0);
    }
}
