use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use collector_core::config::PostgresConfig;

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None if no database is configured or it cannot be reached.
pub async fn init_pg_pool(config: &PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("DATABASE_URL not configured — falling back to in-memory storage");
        return None;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.op_timeout())
        .connect(&config.connection_string())
        .await;

    match pool {
        Ok(pool) => {
            info!(host = %config.host, database = %config.database, "PostgreSQL connected");
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("Database migrations applied successfully");
                    Some(pool)
                }
                Err(e) => {
                    warn!("Failed to run migrations: {} — falling back to in-memory storage", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {} — falling back to in-memory storage", e);
            None
        }
    }
}
