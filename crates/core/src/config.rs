use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::envelope::MAX_BATCH_ITEMS;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub retention: RetentionConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COLLECTOR_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COLLECTOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            redis: RedisConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            retention: RetentionConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:     {}:{}", self.server.host, self.server.port);
        tracing::info!("  postgres:   host={}, db={}, pool={}", self.postgres.host, self.postgres.database, self.postgres.max_connections);
        tracing::info!("  redis:      configured={}, key={}", self.redis.is_configured(), self.redis.backup_key);
        tracing::info!(
            "  queue:      max_size={}, batch_size={}, batch_timeout={}ms, max_pending={}",
            self.queue.max_queue_size,
            self.queue.batch_size,
            self.queue.batch_timeout_ms,
            self.queue.max_pending_per_partition
        );
        tracing::info!("  retention:  {} days, sweep every {}s", self.retention.job_retention_days, self.retention.sweep_interval_secs);
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": {
                "host": self.server.host,
                "port": self.server.port,
                "auth_configured": self.server.auth_token.is_some(),
                "max_batch_items": self.server.max_batch_items,
            },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "redis": {
                "configured": self.redis.is_configured(),
                "backup_key": self.redis.backup_key,
            },
            "queue": {
                "max_queue_size": self.queue.max_queue_size,
                "batch_size": self.queue.batch_size,
                "batch_timeout_ms": self.queue.batch_timeout_ms,
                "max_pending_per_partition": self.queue.max_pending_per_partition,
            },
            "retention": {
                "job_retention_days": self.retention.job_retention_days,
                "sweep_interval_secs": self.retention.sweep_interval_secs,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Shared bearer token workers authenticate with.
    pub auth_token: Option<String>,
    pub max_batch_items: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origin: "*".to_string(),
            auth_token: None,
            max_batch_items: MAX_BATCH_ITEMS,
        }
    }
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            host: profiled_env_or(p, "API_HOST", &d.host),
            port: profiled_env_parse(p, "API_PORT", d.port),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", &d.cors_origin),
            auth_token: profiled_env_opt(p, "WORKER_AUTH_TOKEN"),
            max_batch_items: profiled_env_parse(p, "MAX_BATCH_ITEMS", d.max_batch_items),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full URL; takes precedence over the individual parts when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    /// Upper bound on any single store call.
    pub op_timeout_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "collector".to_string(),
            username: None,
            password: None,
            ssl_mode: "prefer".to_string(),
            max_connections: 20,
            op_timeout_ms: 60_000,
        }
    }
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            url: profiled_env_opt(p, "DATABASE_URL"),
            host: profiled_env_or(p, "PG_HOST", &d.host),
            port: profiled_env_parse(p, "PG_PORT", d.port),
            database: profiled_env_or(p, "PG_DATABASE", &d.database),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", &d.ssl_mode),
            max_connections: profiled_env_parse(p, "DB_POOL_SIZE", d.max_connections),
            op_timeout_ms: profiled_env_parse(p, "DB_OP_TIMEOUT_MS", d.op_timeout_ms),
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

// ── Redis (queue backup) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub backup_key: String,
    pub op_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            backup_key: "collector:queue_backup".to_string(),
            op_timeout_ms: 5_000,
        }
    }
}

impl RedisConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            url: profiled_env_opt(p, "REDIS_URL"),
            backup_key: profiled_env_or(p, "QUEUE_BACKUP_KEY", &d.backup_key),
            op_timeout_ms: profiled_env_parse(p, "REDIS_OP_TIMEOUT_MS", d.op_timeout_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

// ── Queue / aggregation ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    /// Per-partition size trigger.
    pub batch_size: usize,
    /// Global time trigger.
    pub batch_timeout_ms: u64,
    /// Ceiling on unflushed items per partition while writes keep failing.
    pub max_pending_per_partition: usize,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    /// Periodic queue snapshot into the backup store; 0 disables.
    pub checkpoint_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            batch_size: 100,
            batch_timeout_ms: 5_000,
            max_pending_per_partition: 10_000,
            poll_interval_ms: 1_000,
            shutdown_grace_ms: 30_000,
            checkpoint_interval_secs: 0,
        }
    }
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            max_queue_size: profiled_env_parse(p, "MAX_QUEUE_SIZE", d.max_queue_size),
            batch_size: profiled_env_parse(p, "BATCH_SIZE", d.batch_size),
            batch_timeout_ms: profiled_env_parse(p, "BATCH_TIMEOUT_MS", d.batch_timeout_ms),
            max_pending_per_partition: profiled_env_parse(
                p,
                "MAX_PENDING_PER_PARTITION",
                d.max_pending_per_partition,
            ),
            poll_interval_ms: profiled_env_parse(p, "QUEUE_POLL_INTERVAL_MS", d.poll_interval_ms),
            shutdown_grace_ms: profiled_env_parse(p, "SHUTDOWN_GRACE_MS", d.shutdown_grace_ms),
            checkpoint_interval_secs: profiled_env_parse(
                p,
                "QUEUE_CHECKPOINT_SECS",
                d.checkpoint_interval_secs,
            ),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn checkpoint_interval(&self) -> Option<Duration> {
        (self.checkpoint_interval_secs > 0).then(|| Duration::from_secs(self.checkpoint_interval_secs))
    }
}

// ── Job retention ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub job_retention_days: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_retention_days: 7,
            sweep_interval_secs: 3_600,
        }
    }
}

impl RetentionConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            job_retention_days: profiled_env_parse(p, "JOB_RETENTION_DAYS", d.job_retention_days),
            sweep_interval_secs: profiled_env_parse(p, "RETENTION_SWEEP_SECS", d.sweep_interval_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.job_retention_days))
    }
}
