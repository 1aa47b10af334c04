//! HTTP route tests against the axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use tower::ServiceExt;

use pollcast_server::{create_router, AppState, MemoryLister, ServerConfig, WatchConfig};

fn state() -> AppState {
    let watch = WatchConfig::new(["Kustomization"]).with_settling_duration(Duration::ZERO);
    let config = ServerConfig::new().with_watch(watch);
    AppState::with_lister(Arc::new(MemoryLister::new()), config)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_hub_state() {
    let state = state();
    let app = create_router(state.clone());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tenants"], 0);
    assert_eq!(body["metrics"]["workers_started"], 0);
}

#[tokio::test]
async fn test_metrics_is_prometheus_text() {
    let app = create_router(state());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("pollcast_poll_cycles_total"));
}

#[tokio::test]
async fn test_watch_rejects_invalid_tenant() {
    let app = create_router(state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/watch/bad%20tenant")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_watch_streams_connected_and_unsubscribes_on_close() {
    let state = state();
    let hub = state.hub.clone();
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/watch/prod").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(hub.subscriber_count("prod"), 1);

    let mut frames = response.into_body().into_data_stream();
    let first = frames.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains("\"type\":\"CONNECTED\""));
    assert!(text.contains("\"tenantId\":\"prod\""));

    drop(frames);
    assert_eq!(hub.subscriber_count("prod"), 0);
    assert!(!hub.is_watching("prod"));
}
