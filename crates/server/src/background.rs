//! Periodic maintenance tasks spawned next to the aggregator.
//!
//! Each task owns its own `Notify` and exits at the next tick boundary once
//! notified.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use collector_core::config::RetentionConfig;
use collector_queue::IngestionQueue;
use collector_storage::JobLedger;

/// Delete terminal jobs older than the retention window, every sweep interval.
pub fn spawn_retention_sweep(
    ledger: Arc<dyn JobLedger>,
    config: RetentionConfig,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval().max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate tick; the first sweep runs one interval after start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - config.retention();
                    match ledger.sweep_terminal(cutoff).await {
                        Ok(0) => debug!("retention sweep: nothing to delete"),
                        Ok(n) => info!(deleted = n, %cutoff, "retention sweep removed old jobs"),
                        Err(e) => warn!(error = %e, "retention sweep failed"),
                    }
                }
            }
        }
        debug!("retention sweep stopped");
    })
}

/// Snapshot the queue into its backup store every `interval`.
pub fn spawn_checkpoint(
    queue: Arc<IngestionQueue>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate tick; the first checkpoint runs one interval after start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    match queue.checkpoint().await {
                        Ok(n) => debug!(envelopes = n, "queue checkpoint written"),
                        Err(e) => warn!(error = %e, "queue checkpoint failed"),
                    }
                }
            }
        }
        debug!("queue checkpoint stopped");
    })
}
