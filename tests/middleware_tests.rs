mod common;

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use common::{body_json, json_request};
use foodlog::api::idempotent;
use foodlog::idempotency::{
    IdempotencyConfig, IdempotencyLayer, IdempotencyStore, InMemoryIdempotencyStore,
    REPLAYED_HEADER,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

/// Stand-in for the food log table: records every executed insert.
#[derive(Clone, Default)]
struct FakeLogs {
    rows: Arc<Mutex<Vec<(Uuid, Value)>>>,
    failures_left: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl FakeLogs {
    fn executions(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

async fn create_log(State(logs): State<FakeLogs>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if let Some(delay) = logs.delay {
        tokio::time::sleep(delay).await;
    }

    let should_fail = logs
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if should_fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "error": {"code": "INTERNAL_ERROR"}})),
        );
    }

    let id = Uuid::new_v4();
    logs.rows.lock().unwrap().push((id, body.clone()));
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "data": {"id": id, "foodName": body["foodName"]}})),
    )
}

async fn panicking_handler() -> StatusCode {
    panic!("handler exploded");
}

fn app(logs: FakeLogs, store: Arc<InMemoryIdempotencyStore>) -> (Router, IdempotencyLayer) {
    let layer = IdempotencyLayer::new(store, IdempotencyConfig::default());
    let routes = Router::new()
        .route("/logs", post(create_log))
        .route("/explode", post(panicking_handler));
    (idempotent(routes, layer.clone()).with_state(logs), layer)
}

#[tokio::test]
async fn test_apple_then_orange_scenario() {
    let logs = FakeLogs::default();
    let (router, _) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    let first = router
        .clone()
        .oneshot(json_request("POST", "/logs", Some("k1"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get(REPLAYED_HEADER).is_none());
    let first_body = body_json(first).await;
    let id1 = first_body["data"]["id"].clone();

    let replay = router
        .clone()
        .oneshot(json_request("POST", "/logs", Some("k1"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CREATED);
    assert_eq!(replay.headers()[REPLAYED_HEADER], "true");
    assert_eq!(replay.headers()["content-type"], "application/json");
    let replay_body = body_json(replay).await;
    assert_eq!(replay_body, first_body);
    assert_eq!(replay_body["data"]["id"], id1);

    let orange = router
        .oneshot(json_request("POST", "/logs", Some("k1"), r#"{"foodName":"Orange"}"#))
        .await
        .unwrap();
    assert_eq!(orange.status(), StatusCode::CONFLICT);
    let orange_body = body_json(orange).await;
    assert_eq!(orange_body["error"]["code"], "IDEMPOTENCY_CONFLICT");
    assert_eq!(orange_body["error"]["kind"], "key_reused");

    assert_eq!(logs.executions(), 1);
}

#[tokio::test]
async fn test_key_order_does_not_break_replay() {
    let logs = FakeLogs::default();
    let (router, _) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    let first = router
        .clone()
        .oneshot(json_request("POST", "/logs", Some("k2"), r#"{"foodName":"Apple","calories":95}"#))
        .await
        .unwrap();
    let second = router
        .oneshot(json_request("POST", "/logs", Some("k2"), r#"{ "calories": 95, "foodName": "Apple" }"#))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(body_json(first).await, body_json(second).await);
    assert_eq!(logs.executions(), 1);
}

#[tokio::test]
async fn test_same_key_on_other_route_is_key_reuse() {
    let logs = FakeLogs::default();
    let (router, _) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    router
        .clone()
        .oneshot(json_request("POST", "/logs", Some("k3"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();
    let other = router
        .oneshot(json_request("POST", "/explode", Some("k3"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();

    assert_eq!(other.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(other).await["error"]["kind"], "key_reused");
}

#[tokio::test]
async fn test_requests_without_key_are_not_deduplicated() {
    let logs = FakeLogs::default();
    let (router, layer) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(json_request("POST", "/logs", None, r#"{"foodName":"Apple"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    assert_eq!(logs.executions(), 3);
    assert_eq!(layer.metrics().snapshot().passthrough_requests, 3);
}

#[tokio::test]
async fn test_failed_handler_releases_key() {
    let logs = FakeLogs::default();
    logs.failures_left.store(1, Ordering::SeqCst);
    let store = Arc::new(InMemoryIdempotencyStore::default());
    let (router, layer) = app(logs.clone(), Arc::clone(&store));

    let failed = router
        .clone()
        .oneshot(json_request("POST", "/logs", Some("k4"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(store.find("k4").await.unwrap().is_none());

    let retry = router
        .oneshot(json_request("POST", "/logs", Some("k4"), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::CREATED);
    assert_eq!(logs.executions(), 1);

    let snapshot = layer.metrics().snapshot();
    assert_eq!(snapshot.abandoned_requests, 1);
    assert_eq!(snapshot.completed_requests, 1);
}

#[tokio::test]
async fn test_panicking_handler_releases_key() {
    let store = Arc::new(InMemoryIdempotencyStore::default());
    let (router, _) = app(FakeLogs::default(), Arc::clone(&store));

    let response = router
        .oneshot(json_request("POST", "/explode", Some("k5"), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["code"], "INTERNAL_ERROR");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicates_execute_once() {
    let logs = FakeLogs {
        delay: Some(Duration::from_millis(100)),
        ..FakeLogs::default()
    };
    let (router, _) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router
                .oneshot(json_request("POST", "/logs", Some("race"), r#"{"foodName":"Apple"}"#))
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    let mut in_flight = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        match response.status() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {
                assert_eq!(body_json(response).await["error"]["kind"], "in_flight");
                in_flight += 1;
            }
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(logs.executions(), 1);
    assert_eq!(created + in_flight, 10);
    assert!(created >= 1);
}

#[tokio::test]
async fn test_empty_key_rejected() {
    let logs = FakeLogs::default();
    let (router, _) = app(logs.clone(), Arc::new(InMemoryIdempotencyStore::default()));

    let response = router
        .oneshot(json_request("POST", "/logs", Some("   "), r#"{"foodName":"Apple"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(logs.executions(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let logs = FakeLogs::default();
    let store = Arc::new(InMemoryIdempotencyStore::default());
    let config = IdempotencyConfig {
        max_body_bytes: 16,
        ..IdempotencyConfig::default()
    };
    let layer = IdempotencyLayer::new(store.clone(), config);
    let router = idempotent(Router::new().route("/logs", post(create_log)), layer).with_state(logs.clone());

    let response = router
        .oneshot(json_request("POST", "/logs", Some("k6"), r#"{"foodName":"A very long apple name"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(logs.executions(), 0);
    assert!(store.is_empty());
}
