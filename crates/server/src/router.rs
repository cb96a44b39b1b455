//! HTTP router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Ceiling on request bodies. A full batch of items with raw payloads fits
/// comfortably.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the application router. Agent endpoints live under `/api/collector`;
/// `/health` stays at the root for probes.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    let collector = Router::new()
        .route("/messages", post(api::submit_messages))
        .route("/heartbeat", post(api::heartbeat))
        .route("/jobs", get(api::list_jobs).post(api::create_job))
        .route("/jobs/{job_id}/start", post(api::start_job))
        .route("/jobs/{job_id}/complete", post(api::complete_job))
        .route("/jobs/{job_id}/fail", post(api::fail_job))
        .route("/partitions/{partition_key}", put(api::upsert_partition))
        .route("/partitions/{partition_key}/stats", get(api::partition_stats))
        .route("/stats", get(api::stats));

    Router::new()
        .route("/health", get(api::health))
        .nest("/api/collector", collector)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// `*` is permissive; otherwise a comma-separated origin list.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin.trim() == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
