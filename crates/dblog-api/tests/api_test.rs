//! HTTP tests for the correlation-id middleware and the users service.
//!
//! Requests go through the full router via `tower::ServiceExt::oneshot`,
//! backed by a mock connection wrapped in the logging driver.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use tower::ServiceExt;

use dblog_api::middleware::{correlation_id_middleware, CORRELATION_ID};
use dblog_api::{router, AppState};
use dblog_core::test_fixtures::{capturing_logger, CapturedLogs};
use dblog_core::{RequestContext, Value};
use dblog_db::mock::{MockCalls, MockDriver};
use dblog_db::{Database, DriverRegistry, LoggingDriver, Rows};

async fn test_app(mock: MockDriver) -> (Router, CapturedLogs, MockCalls) {
    let (logger, logs) = capturing_logger();
    let calls = mock.calls();
    let mut registry = DriverRegistry::new();
    registry
        .register("mock-with-logging", LoggingDriver::new(mock, logger))
        .unwrap();
    let db = Database::open(&registry, "mock-with-logging", "mock://")
        .await
        .unwrap();
    (router(AppState::new(db)), logs, calls)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn echo_app() -> Router {
    Router::new()
        .route(
            "/",
            get(|Extension(ctx): Extension<RequestContext>| async move {
                ctx.correlation_id().to_string()
            }),
        )
        .layer(axum::middleware::from_fn(correlation_id_middleware))
}

#[tokio::test]
async fn test_middleware_echoes_incoming_id() {
    let response = echo_app()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Correlation-ID", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[&CORRELATION_ID], "req-42");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"req-42");
}

#[tokio::test]
async fn test_middleware_generates_missing_id() {
    let response = echo_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let header = response.headers()[&CORRELATION_ID]
        .to_str()
        .unwrap()
        .to_string();
    let parsed = uuid::Uuid::parse_str(&header).unwrap();
    assert_eq!(parsed.get_version_num(), 4);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], header.as_bytes());
}

#[tokio::test]
async fn test_middleware_ids_differ_per_request() {
    let app = echo_app();
    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        seen.push(response.headers()[&CORRELATION_ID].clone());
    }
    assert_ne!(seen[0], seen[1]);
    assert_ne!(seen[1], seen[2]);
}

#[tokio::test]
async fn test_health() {
    let (app, logs, _calls) = test_app(MockDriver::new()).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(&CORRELATION_ID));
    assert_eq!(body_json(response).await["status"], "ok");
    // ping is not an intercepted call
    assert_eq!(logs.record_count(), 0);
}

#[tokio::test]
async fn test_get_user_logs_request_correlation_id() {
    let rows = Rows::new(
        vec!["id".to_string(), "name".to_string(), "email".to_string()],
        vec![vec![
            Value::Int(7),
            Value::from("John Doe"),
            Value::from("j.example@example.com"),
        ]],
    );
    let (app, logs, calls) = test_app(MockDriver::new().with_rows(rows)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/7")
                .header("X-Correlation-ID", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[&CORRELATION_ID], "abc-123");
    let body = body_json(response).await;
    assert_eq!(body["id"], 7);
    assert_eq!(body["name"], "John Doe");

    let out = logs.contents();
    assert_eq!(logs.record_count(), 1);
    assert!(out.contains("QueryContext correlation_id=abc-123\n"));
    assert!(out.contains("Args:\n      [7]"));
    assert_eq!(calls.all()[0].correlation_id, "abc-123");
}

#[tokio::test]
async fn test_get_user_not_found() {
    let (app, _logs, _calls) = test_app(MockDriver::new()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/99")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Not found: user 99");
}

#[tokio::test]
async fn test_create_user_returns_id() {
    let rows = Rows::new(vec!["id".to_string()], vec![vec![Value::Int(11)]]);
    let (app, logs, calls) = test_app(MockDriver::new().with_rows(rows)).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/users")
                .header("content-type", "application/json")
                .header("X-Correlation-ID", "create-1")
                .body(Body::from(
                    r#"{"name":"Bill Doe","email":"b.example@example.com"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], 11);

    assert!(logs
        .contents()
        .contains("Args:\n      [Bill Doe, b.example@example.com]"));
    assert_eq!(
        calls.all()[0].args,
        vec![Value::from("Bill Doe"), Value::from("b.example@example.com")]
    );
}

#[tokio::test]
async fn test_create_user_rejects_blank_fields() {
    let (app, logs, calls) = test_app(MockDriver::new()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/users")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"  ","email":"x@example.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(calls.is_empty());
    assert_eq!(logs.record_count(), 0);
}

#[tokio::test]
async fn test_list_users_rejects_bad_limit() {
    let (app, _logs, _calls) = test_app(MockDriver::new()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users?limit=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_users_passes_paging_args() {
    let (app, logs, calls) = test_app(MockDriver::new()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/users?limit=10&offset=20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
    assert_eq!(calls.all()[0].args, vec![Value::Int(10), Value::Int(20)]);
    assert!(logs.contents().contains("Args:\n      [10, 20]"));
}
