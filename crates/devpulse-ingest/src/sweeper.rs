//! Background liveness sweeper.
//!
//! A single recurring task that retires devices which stopped reporting.
//! Runs never overlap: the loop awaits each sweep before taking the next
//! tick, and a long sweep simply delays the following one.

use std::sync::Arc;
use std::time::Duration;

use devpulse_storage::DeviceStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Default sweep period.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Periodic task that transitions stale active devices to inactive.
pub struct LivenessSweeper {
    store: Arc<DeviceStore>,
    period: Duration,
}

impl LivenessSweeper {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self {
            store,
            period: SWEEP_PERIOD,
        }
    }

    /// Set the sweep period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Spawn the sweep loop. It runs until `shutdown` flips or its sender
    /// is dropped; a failed sweep is logged and retried on the next tick.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the immediate first tick; the first sweep happens one
        // full period after startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    match self.store.sweep_inactive() {
                        Ok(0) => {}
                        Ok(affected) => info!(affected, "marked stale devices inactive"),
                        Err(e) => warn!(error = %e, "liveness sweep failed"),
                    }
                }
            }
        }

        info!("liveness sweeper stopped");
    }
}
