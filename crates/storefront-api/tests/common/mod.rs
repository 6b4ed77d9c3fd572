//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use storefront_core::clock::Clock;
use storefront_core::stream::EventStreamBackend;
use storefront_event_store::{AggregateStore, InMemoryEventStreams};
use storefront_orders::application::retry::RetryPolicy;
use storefront_test_support::FixedClock;
use tower::ServiceExt;

use storefront_api::routes;
use storefront_api::state::AppState;

fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::default())
}

/// Build the full app router over a fresh in-memory backend. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app() -> Router {
    build_test_app_with(Arc::new(InMemoryEventStreams::new()))
}

/// Build the full app router over the given backend.
pub fn build_test_app_with(backend: Arc<dyn EventStreamBackend>) -> Router {
    let app_state = AppState::new(
        fixed_clock(),
        AggregateStore::new(backend),
        RetryPolicy::default(),
        "in-memory",
    );
    routes::app_router(app_state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a body-less request with the given method and return the response.
pub async fn request(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    request(app, "GET", uri).await
}
