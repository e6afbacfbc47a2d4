//! Periodic eviction of expired windows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::policy::LimiterSet;

/// A background task that periodically evicts expired windows from a
/// [`LimiterSet`].
///
/// The sweeper has an explicit lifecycle: [`start`](Self::start) spawns the
/// task and [`stop`](Self::stop) shuts it down and waits for it to finish,
/// so tests can halt it deterministically instead of leaking a timer.
/// Eviction takes the same per-limiter lock as admission, so a sweep never
/// races an in-flight admission on the same key.
pub struct Sweeper {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping the given limiter set on a fixed interval.
    pub fn start(limiters: Arc<LimiterSet>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // sweep happens one full interval after start.
            ticker.tick().await;

            debug!(interval_secs = interval.as_secs_f64(), "Sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now_ms = Utc::now().timestamp_millis();
                        limiters.sweep_expired(now_ms);
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            debug!("Sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the sweep task to stop and wait for it to finish.
    pub async fn stop(self) {
        // The task may already have exited if the runtime is shutting down.
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            info!(error = %e, "Sweeper task did not shut down cleanly");
        }
    }
}
