use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use collector_core::config::load_dotenv;
use collector_server::cli::Cli;
use collector_server::startup;
use collector_storage::{init_pg_pool, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config();
    config.log_summary();

    let pool = if cli.in_memory {
        None
    } else {
        init_pg_pool(&config.postgres).await
    };

    match pool {
        Some(pool) => {
            let store = Arc::new(PgStore::new(pool.clone(), config.postgres.op_timeout()));
            let result = startup::run(config, store).await;
            pool.close().await;
            result
        }
        None => {
            warn!("running without PostgreSQL — jobs, workers and items are kept in memory only");
            startup::run(config, Arc::new(MemoryStore::new())).await
        }
    }
}
