//! Crate-level integration tests: each exercises the full `build_app` router
//! (routing, middleware stack, handlers) via `tower::ServiceExt::oneshot`,
//! following the concrete scenarios in §8 of the spec this collector
//! implements.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use metrics_core::SignatureService;
use metrics_storage::MemoryStorage;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::build_app;
use crate::state::AppState;

fn test_state() -> AppState {
    AppState::new(Arc::new(MemoryStorage::new(None)), SignatureService::new(Vec::new()), None)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body must be readable");
    String::from_utf8(bytes.to_vec()).expect("response body must be utf8")
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(response).await).expect("response body must be valid json")
}

#[tokio::test]
async fn legacy_gauge_write_then_read_round_trips() {
    let app = build_app(test_state());

    let update = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/1.0")
        .body(Body::empty())
        .expect("request must build");
    let update_resp = app.clone().oneshot(update).await.expect("response expected");
    assert_eq!(update_resp.status(), StatusCode::OK);

    let read = Request::builder()
        .method("GET")
        .uri("/value/gauge/Alloc")
        .body(Body::empty())
        .expect("request must build");
    let read_resp = app.oneshot(read).await.expect("response expected");
    assert_eq!(read_resp.status(), StatusCode::OK);
    assert_eq!(body_string(read_resp).await, "1");
}

#[tokio::test]
async fn legacy_counter_writes_accumulate() {
    let app = build_app(test_state());

    for _ in 0..2 {
        let update = Request::builder()
            .method("POST")
            .uri("/update/counter/testCounter/100")
            .body(Body::empty())
            .expect("request must build");
        let resp = app.clone().oneshot(update).await.expect("response expected");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let read = Request::builder()
        .method("GET")
        .uri("/value/counter/testCounter")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(read).await.expect("response expected");
    assert_eq!(body_string(resp).await, "200");
}

#[tokio::test]
async fn legacy_malformed_gauge_value_is_bad_request() {
    let app = build_app(test_state());
    let update = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/hello")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(update).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn legacy_unknown_kind_is_not_implemented() {
    let app = build_app(test_state());
    let update = Request::builder()
        .method("POST")
        .uri("/update/unknown/Alloc/1.0")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(update).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn legacy_read_of_unknown_id_is_not_found() {
    let app = build_app(test_state());
    let read = Request::builder()
        .method("GET")
        .uri("/value/gauge/DoesNotExist")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(read).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn structured_batch_applies_in_array_order_across_two_requests() {
    let app = build_app(test_state());

    let first_batch = json!([
        {"id": "A", "type": "gauge", "value": 1.0},
        {"id": "C", "type": "counter", "delta": 1},
    ]);
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("content-type", "application/json")
        .body(Body::from(first_batch.to_string()))
        .expect("request must build");
    let resp = app.clone().oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);

    let second_batch = json!([
        {"id": "A", "type": "gauge", "value": 2.0},
        {"id": "C", "type": "counter", "delta": 2},
    ]);
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("content-type", "application/json")
        .body(Body::from(second_batch.to_string()))
        .expect("request must build");
    let resp = app.clone().oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);

    let read_a = Request::builder()
        .method("GET")
        .uri("/value/gauge/A")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.clone().oneshot(read_a).await.expect("response expected");
    assert_eq!(body_string(resp).await, "2");

    let read_c = Request::builder()
        .method("GET")
        .uri("/value/counter/C")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(read_c).await.expect("response expected");
    assert_eq!(body_string(resp).await, "3");
}

#[tokio::test]
async fn empty_batch_is_ok_and_mutates_nothing() {
    let app = build_app(test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("content-type", "application/json")
        .body(Body::from("[]"))
        .expect("request must build");
    let resp = app.clone().oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);

    let read = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(read).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_record_is_accepted_and_flipped_hash_is_rejected() {
    let signature = SignatureService::new(b"k".to_vec());
    let state = AppState::new(Arc::new(MemoryStorage::new(None)), signature.clone(), None);
    let app = build_app(state);

    let mut record = metrics_core::MetricRecord::gauge("A", 1.0);
    record.hash = signature.sign(&record);

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&record).unwrap()))
        .expect("request must build");
    let resp = app.clone().oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);

    let mut hash = record.hash.clone().unwrap();
    let last = hash.pop().unwrap();
    hash.push(if last == '0' { '1' } else { '0' });
    record.hash = Some(hash);

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&record).unwrap()))
        .expect("request must build");
    let resp = app.oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn source_ip_outside_trusted_subnet_is_forbidden_and_does_not_mutate() {
    let state = AppState::new(
        Arc::new(MemoryStorage::new(None)),
        SignatureService::new(Vec::new()),
        Some("10.0.0.0/8".parse().unwrap()),
    );
    let app = build_app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/1.0")
        .header("x-real-ip", "192.168.1.1")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.clone().oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let read = Request::builder()
        .method("GET")
        .uri("/value/gauge/Alloc")
        .header("x-real-ip", "10.0.0.1")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(read).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ping_fails_against_in_memory_backend() {
    let app = build_app(test_state());
    let request = Request::builder()
        .method("GET")
        .uri("/ping")
        .body(Body::empty())
        .expect("request must build");
    let resp = app.oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn index_lists_known_gauges_and_counters() {
    let app = build_app(test_state());

    let update = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/1.0")
        .body(Body::empty())
        .expect("request must build");
    app.clone().oneshot(update).await.expect("response expected");

    let request = Request::builder().uri("/").body(Body::empty()).expect("request must build");
    let resp = app.oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains("Alloc"));
}

#[tokio::test]
async fn structured_read_echoes_id_and_kind() {
    let app = build_app(test_state());

    let update = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/3.5")
        .body(Body::empty())
        .expect("request must build");
    app.clone().oneshot(update).await.expect("response expected");

    let query = json!({"id": "Alloc", "type": "gauge"});
    let request = Request::builder()
        .method("POST")
        .uri("/value/")
        .header("content-type", "application/json")
        .body(Body::from(query.to_string()))
        .expect("request must build");
    let resp = app.oneshot(request).await.expect("response expected");
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["id"], "Alloc");
    assert_eq!(json["value"], 3.5);
}
