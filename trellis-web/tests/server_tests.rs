mod common;

use axum::{body::Body, extract::Request, routing::get, Router};
use common::*;
use http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use trellis_core::{MemoryStore, RequestContext, Transaction};
use trellis_web::{RouteRequest, ServerProperties, WebServer};

fn app(properties: ServerProperties) -> Router {
    let store = MemoryStore::with_documents([("notes/root", json!({ "id": "root" }))]);
    let dispatcher = dispatcher(
        routes().api(Method::GET, "/api/notes/:noteId", |req: RouteRequest, tx: Transaction| async move {
            let note = tx.get(&format!("notes/{}", req.param("noteId")?)).await?;
            Ok(note.unwrap_or_default())
        }),
        &store,
    );

    WebServer::new(properties, dispatcher)
        .with_router(Router::new().route("/", get(|| async { "index" })))
        .into_router()
}

#[tokio::test]
async fn test_dispatcher_is_fallback() {
    let response = app(ServerProperties::default())
        .oneshot(empty(Method::GET, "/api/notes/root"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"id":"root"}"#);
}

#[tokio::test]
async fn test_pages_are_served_ahead_of_dispatcher() {
    let response = app(ServerProperties::default())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "index");
}

#[tokio::test]
async fn test_unknown_path_is_404_with_request_id() {
    let response = app(ServerProperties::default())
        .oneshot(empty(Method::GET, "/api/nothing-here"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let id = response.headers().get("x-request-id").unwrap();
    assert_eq!(id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let request = request(Method::GET, "/api/notes/root")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app(ServerProperties::default())
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
}

#[tokio::test]
async fn test_request_logging_layer() {
    let (logs, _guard) = capture_logs();
    let response = app(ServerProperties::default())
        .oneshot(empty(Method::GET, "/api/notes/root"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(logs.contents().contains("Request completed"));

    let (logs, _guard) = capture_logs();
    let quiet = ServerProperties {
        enable_request_logging: false,
        ..ServerProperties::default()
    };
    app(quiet)
        .oneshot(empty(Method::GET, "/api/notes/root"))
        .await
        .unwrap();
    assert!(!logs.contents().contains("Request completed"));
}

#[tokio::test]
async fn test_cors_layer() {
    let cors = ServerProperties {
        enable_cors: true,
        ..ServerProperties::default()
    };
    let request = request(Method::GET, "/api/notes/root")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app(cors).oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_no_context_leaks_to_caller() {
    app(ServerProperties::default())
        .oneshot(empty(Method::GET, "/api/notes/root"))
        .await
        .unwrap();
    assert!(!RequestContext::is_active());
}
