//! HTTP contract tests against the full router over in-memory storage.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use collector_core::{Item, MAX_BATCH_ITEMS};
use collector_queue::{IngestionQueue, MemoryBackupStore};
use collector_server::router::build_router;
use collector_server::{AppState, Collector};
use collector_storage::{MemoryStore, StorageWriter};

const TOKEN: &str = "test-token";

// ── Harness ───────────────────────────────────────────────────────

struct Harness {
    app: Router,
    queue: Arc<IngestionQueue>,
    store: Arc<MemoryStore>,
}

fn harness_with(capacity: usize, token: Option<&str>) -> Harness {
    let queue = Arc::new(IngestionQueue::new(capacity, Arc::new(MemoryBackupStore::new())));
    let store = Arc::new(MemoryStore::new());
    let collector = Arc::new(Collector::new(queue.clone(), store.clone(), MAX_BATCH_ITEMS, 100));
    let state = Arc::new(AppState::new(collector, token.map(str::to_string)));
    Harness {
        app: build_router(state, "*"),
        queue,
        store,
    }
}

fn harness() -> Harness {
    harness_with(100, Some(TOKEN))
}

fn request(method: Method, uri: &str, worker: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    if let Some(worker) = worker {
        builder = builder.header("X-Worker-ID", worker);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn messages(partition: i64, count: i64) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({ "id": i, "timestamp": Utc::now(), "text": format!("item {i}") }))
        .collect();
    json!({ "partition_key": partition, "items": items })
}

// ── Health & auth ────────────────────────────────────────────────

#[tokio::test]
async fn test_health_needs_no_auth() {
    let h = harness();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["queue_size"], 0);
    assert_eq!(body["max_queue_size"], 100);
    assert_eq!(body["batch_size"], 100);
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let h = harness();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/collector/messages")
        .header(header::AUTHORIZATION, "Bearer nope")
        .header("X-Worker-ID", "w1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(messages(1, 1).to_string()))
        .unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("invalid"));
    assert_eq!(h.queue.len().await, 0);
}

#[tokio::test]
async fn test_missing_worker_id_is_bad_request() {
    let h = harness();
    let (status, _) = send(&h.app, request(Method::GET, "/api/collector/stats", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unconfigured_token_refuses_everyone() {
    let h = harness_with(100, None);
    let (status, _) = send(
        &h.app,
        request(Method::GET, "/api/collector/stats", Some("w1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Ingestion ────────────────────────────────────────────────────

#[tokio::test]
async fn test_submit_messages_queues_batch() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        request(Method::POST, "/api/collector/messages", Some("w1"), Some(messages(42, 3))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messages_count"], 3);
    assert!(body["batch_id"].is_string());
    assert_eq!(h.queue.len().await, 1);
}

#[tokio::test]
async fn test_submit_accepts_legacy_field_names() {
    let h = harness();
    let body = json!({
        "channel_id": 9,
        "messages": [{ "message_id": 1, "date": Utc::now(), "reply_to_msg_id": 0 }],
    });
    let (status, resp) = send(
        &h.app,
        request(Method::POST, "/api/collector/messages", Some("w1"), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{resp}");

    let envelope = h
        .queue
        .dequeue(std::time::Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(envelope.partition_key, 9);
    assert_eq!(envelope.items[0].id, 1);
    assert_eq!(envelope.items[0].reply_to, Some(0));
}

#[tokio::test]
async fn test_empty_and_oversized_batches_are_rejected() {
    let h = harness();
    let (status, _) = send(
        &h.app,
        request(Method::POST, "/api/collector/messages", Some("w1"), Some(messages(1, 0))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/collector/messages",
            Some("w1"),
            Some(messages(1, MAX_BATCH_ITEMS as i64 + 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(h.queue.len().await, 0);
}

#[tokio::test]
async fn test_negative_counter_is_rejected_before_queueing() {
    let h = harness();
    let body = json!({
        "partition_key": 1,
        "items": [{ "id": 1, "timestamp": Utc::now(), "views": -3 }],
    });
    let (status, _) = send(
        &h.app,
        request(Method::POST, "/api/collector/messages", Some("w1"), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.queue.len().await, 0);
}

#[tokio::test]
async fn test_full_queue_answers_503_with_retry_after() {
    let h = harness_with(1, Some(TOKEN));
    let first = request(Method::POST, "/api/collector/messages", Some("w1"), Some(messages(1, 1)));
    assert_eq!(send(&h.app, first).await.0, StatusCode::OK);

    let second = request(Method::POST, "/api/collector/messages", Some("w1"), Some(messages(1, 1)));
    let resp = h.app.clone().oneshot(second).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(h.queue.len().await, 1);
}

#[tokio::test]
async fn test_heartbeat_registers_worker() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/collector/heartbeat",
            Some("agent-7"),
            Some(json!({ "status": "idle", "metadata": { "version": "1.2" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].is_string());

    let (status, stats) = send(
        &h.app,
        request(Method::GET, "/api/collector/stats", Some("agent-7"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["queue_size"], 0);
    assert_eq!(stats["worker_stats"]["jobs_completed"], 0);
}

// ── Jobs ─────────────────────────────────────────────────────────

async fn seed_job(h: &Harness, partition: i64) -> String {
    let (status, _) = send(
        &h.app,
        request(
            Method::PUT,
            &format!("/api/collector/partitions/{partition}"),
            Some("ops"),
            Some(json!({ "handle": "news" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, job) = send(
        &h.app,
        request(
            Method::POST,
            "/api/collector/jobs",
            Some("ops"),
            Some(json!({ "channel_id": partition, "job_type": "update", "priority": 7 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["state"], "pending");
    job["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_job_lifecycle_over_http() {
    let h = harness();
    let job_id = seed_job(&h, 11).await;

    let (status, listed) = send(
        &h.app,
        request(Method::GET, "/api/collector/jobs?limit=5", Some("w1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["job_id"], job_id.as_str());
    assert_eq!(listed[0]["partition_handle"], "news");

    let start = format!("/api/collector/jobs/{job_id}/start");
    let (status, ack) = send(&h.app, request(Method::POST, &start, Some("w1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);

    // Same worker again is an idempotent success.
    let (status, _) = send(&h.app, request(Method::POST, &start, Some("w1"), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, request(Method::POST, &start, Some("w2"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already claimed"));

    let (_, listed) = send(&h.app, request(Method::GET, "/api/collector/jobs", Some("w1"), None)).await;
    assert!(listed.as_array().unwrap().is_empty());

    let complete = format!("/api/collector/jobs/{job_id}/complete");
    let (status, _) = send(
        &h.app,
        request(Method::POST, &complete, Some("w2"), Some(json!({ "messages_count": 5 }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &h.app,
        request(Method::POST, &complete, Some("w1"), Some(json!({ "messages_count": 5 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let fail = format!("/api/collector/jobs/{job_id}/fail");
    let (status, _) = send(
        &h.app,
        request(Method::POST, &fail, Some("w1"), Some(json!({ "error_message": "late" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_failing_a_claimed_job() {
    let h = harness();
    let job_id = seed_job(&h, 12).await;
    send(
        &h.app,
        request(Method::POST, &format!("/api/collector/jobs/{job_id}/start"), Some("w1"), None),
    )
    .await;

    let (status, _) = send(
        &h.app,
        request(
            Method::POST,
            &format!("/api/collector/jobs/{job_id}/fail"),
            Some("w1"),
            Some(json!({ "error_message": "flood wait" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&h.app, request(Method::GET, "/api/collector/stats", Some("w1"), None)).await;
    // No heartbeat yet, so the worker has no record to count against.
    assert_eq!(stats["worker_stats"]["jobs_failed"], 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness();
    let uri = format!("/api/collector/jobs/{}/start", uuid::Uuid::new_v4());
    let (status, _) = send(&h.app, request(Method::POST, &uri, Some("w1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_paused_partition_hides_its_jobs() {
    let h = harness();
    seed_job(&h, 13).await;
    let (status, record) = send(
        &h.app,
        request(
            Method::PUT,
            "/api/collector/partitions/13",
            Some("ops"),
            Some(json!({ "status": "paused" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "paused");
    assert_eq!(record["handle"], "news");

    let (_, listed) = send(&h.app, request(Method::GET, "/api/collector/jobs", Some("w1"), None)).await;
    assert!(listed.as_array().unwrap().is_empty());
}

// ── Partitions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_partition_stats_reflect_stored_items() {
    let h = harness();
    let items = vec![
        Item::new(1, Utc::now()).with_counters(10, 0, 0),
        Item::new(2, Utc::now()).with_counters(30, 0, 0),
    ];
    h.store.write(77, &items).await.unwrap();

    let (status, stats) = send(
        &h.app,
        request(Method::GET, "/api/collector/partitions/77/stats", Some("ops"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_items"], 2);
    assert_eq!(stats["avg_views"], 20.0);
}
