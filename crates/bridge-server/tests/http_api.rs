// Control API tests
//
// Drives the REST surface directly through the router: bridge start/stop,
// state inspection across the retention window, statistics, and the
// call-event webhook.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use callbridge_bridge_core::{CallId, SessionState};
use callbridge_link_core::testing::{EndpointOptions, MockVoiceEndpoint};

use common::*;

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_bridge_lifecycle_over_rest() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let provider = StreamPairProvider::new();
    let state = test_state(endpoint.url(), provider.clone());
    let app = callbridge_server::router(state.clone());

    // start
    let response = app.clone().oneshot(post("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["call_id"], "call-1");

    let call_id = CallId::new("call-1");
    wait_until(Duration::from_secs(2), "bridge active", || {
        state.controller.session_state(&call_id) == Some(SessionState::Active)
    })
    .await;

    // duplicate start is rejected, session untouched
    let response = app.clone().oneshot(post("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        state.controller.session_state(&call_id),
        Some(SessionState::Active)
    );

    // inspect
    let response = app.clone().oneshot(get("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["state"], "active");

    // stats
    let response = app.clone().oneshot(get("/bridges")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["totals"]["active"], 1);
    assert_eq!(body["sessions"][0]["call_id"], "call-1");

    // stop -> drains -> closed, observable through retention, then gone
    let response = app.clone().oneshot(delete("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_until(Duration::from_secs(3), "bridge closed", || {
        state.controller.session_state(&call_id) == Some(SessionState::Closed)
    })
    .await;

    let response = app.clone().oneshot(get("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["state"], "closed");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let response = app.clone().oneshot(get("/bridges/call-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_without_session_is_not_found() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let state = test_state(endpoint.url(), StreamPairProvider::new());
    let app = callbridge_server::router(state);

    let response = app.oneshot(delete("/bridges/no-such-call")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_call_event_webhook_drives_dispatcher() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let state = test_state(endpoint.url(), StreamPairProvider::new());
    let app = callbridge_server::router(state.clone());

    let response = app
        .clone()
        .oneshot(post_json(
            "/events",
            r#"{"call_id":"call-9","kind":"started"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let call_id = CallId::new("call-9");
    wait_until(Duration::from_secs(2), "event-driven bridge", || {
        state.controller.session_state(&call_id) == Some(SessionState::Active)
    })
    .await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/events",
            r#"{"call_id":"call-9","kind":"ended"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_until(Duration::from_secs(3), "event-driven close", || {
        state.controller.session_state(&call_id) == Some(SessionState::Closed)
    })
    .await;
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let state = test_state(endpoint.url(), StreamPairProvider::new());
    let app = callbridge_server::router(state);

    let response = app
        .oneshot(post_json("/events", r#"{"call_id":"x","kind":"exploded"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
