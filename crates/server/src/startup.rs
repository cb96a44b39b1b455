//! Process wiring: backup store, queue restore, background tasks, HTTP
//! serving and the ordered shutdown that follows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use collector_core::config::RedisConfig;
use collector_core::Config;
use collector_queue::{AggregatorConfig, BackupStore, BatchAggregator, IngestionQueue, MemoryBackupStore};
use collector_storage::{JobLedger, PartitionCatalog, StorageWriter, WorkerRegistry};

use crate::background::{spawn_checkpoint, spawn_retention_sweep};
use crate::router::build_router;
use crate::service::Collector;
use crate::state::AppState;

/// Extra time granted to the aggregator on top of its own flush grace.
const AGGREGATOR_JOIN_MARGIN: Duration = Duration::from_secs(5);

/// Run the collector until a shutdown signal, on top of `store`.
pub async fn run<S>(config: Config, store: Arc<S>) -> anyhow::Result<()>
where
    S: JobLedger + WorkerRegistry + PartitionCatalog + StorageWriter + 'static,
{
    if config.server.auth_token.is_none() {
        warn!("WORKER_AUTH_TOKEN not set — every agent request will be refused with 401");
    }

    let backup = build_backup(&config.redis).await;
    let queue = Arc::new(IngestionQueue::new(config.queue.max_queue_size, backup));
    queue.restore().await;

    // ── Background tasks ──────────────────────────────────────────
    let aggregator_shutdown = Arc::new(Notify::new());
    let aggregator = BatchAggregator::new(
        queue.clone(),
        store.clone(),
        AggregatorConfig::from(&config.queue),
    );
    let aggregator_handle = tokio::spawn(aggregator.run(aggregator_shutdown.clone()));

    let sweep_shutdown = Arc::new(Notify::new());
    let sweep_handle = spawn_retention_sweep(
        store.clone(),
        config.retention.clone(),
        sweep_shutdown.clone(),
    );

    let checkpoint = config.queue.checkpoint_interval().map(|interval| {
        let shutdown = Arc::new(Notify::new());
        let handle = spawn_checkpoint(queue.clone(), interval, shutdown.clone());
        (handle, shutdown)
    });

    // ── HTTP ──────────────────────────────────────────────────────
    let collector = Arc::new(Collector::new(
        queue.clone(),
        store,
        config.server.max_batch_items,
        config.queue.batch_size,
    ));
    let state = Arc::new(AppState::new(collector, config.server.auth_token.clone()));
    let app = build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Collector listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Shutdown ──────────────────────────────────────────────────
    // Aggregator first: its leftovers go back into the queue before the
    // queue is backed up.
    info!("HTTP server stopped, draining aggregator");
    aggregator_shutdown.notify_one();
    let join_timeout = config.queue.shutdown_grace() + AGGREGATOR_JOIN_MARGIN;
    match tokio::time::timeout(join_timeout, aggregator_handle).await {
        Ok(Ok(report)) => info!(
            flushed_items = report.flushed_items,
            requeued_items = report.requeued_items,
            "aggregator finished"
        ),
        Ok(Err(e)) => error!(error = %e, "aggregator task panicked"),
        Err(_) => error!(
            timeout_ms = join_timeout.as_millis() as u64,
            "aggregator did not stop in time — its pending items are lost"
        ),
    }

    sweep_shutdown.notify_one();
    if let Err(e) = sweep_handle.await {
        warn!(error = %e, "retention sweep task failed");
    }
    if let Some((handle, shutdown)) = checkpoint {
        shutdown.notify_one();
        if let Err(e) = handle.await {
            warn!(error = %e, "checkpoint task failed");
        }
    }

    if let Err(e) = queue.shutdown(config.redis.op_timeout()).await {
        error!(error = %e, "queued batches could not be backed up");
    }
    info!("collector stopped");
    Ok(())
}

#[cfg(feature = "queue-redis")]
async fn build_backup(config: &RedisConfig) -> Arc<dyn BackupStore> {
    use collector_queue::RedisBackupStore;

    if let Some(url) = config.url.as_deref() {
        match RedisBackupStore::connect(url, config.backup_key.clone(), config.op_timeout()).await {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!(error = %e, "Redis backup unavailable, falling back to memory"),
        }
    }
    memory_backup()
}

#[cfg(not(feature = "queue-redis"))]
async fn build_backup(config: &RedisConfig) -> Arc<dyn BackupStore> {
    if config.is_configured() {
        warn!("REDIS_URL is set but this build has no Redis support");
    }
    memory_backup()
}

fn memory_backup() -> Arc<dyn BackupStore> {
    warn!("queue backup is in-memory — queued batches will not survive a restart");
    Arc::new(MemoryBackupStore::new())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
