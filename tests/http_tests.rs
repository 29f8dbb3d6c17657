// Integration tests for the HTTP recording API
//
// Requests go straight through the router without binding a socket.

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use capture_session::{create_router, AppState, SessionConfig, SessionState, SessionStats};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn router_in(dir: &TempDir) -> Router {
    create_router(AppState::new(SessionConfig {
        output_path: dir.path().join("recording.mp4"),
        width: 640,
        height: 360,
        ..Default::default()
    }))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let router = router_in(&temp_dir);

    let (status, body) = send(&router, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
    Ok(())
}

#[tokio::test]
async fn test_record_start_status_stop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let router = router_in(&temp_dir);

    let (status, body) = send(
        &router,
        Method::POST,
        "/sessions/record/start",
        Some(json!({ "session_id": "standup" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "standup");
    assert_eq!(body["status"], json!(SessionState::Running));

    // Same id while known is a conflict
    let (status, body) = send(
        &router,
        Method::POST,
        "/sessions/record/start",
        Some(json!({ "session_id": "standup" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_started");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = send(&router, Method::GET, "/sessions/standup/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    let stats: SessionStats = serde_json::from_value(body)?;
    assert_eq!(stats.state, SessionState::Running);

    let (status, body) = send(&router, Method::POST, "/sessions/record/stop/standup", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!(SessionState::Stopped));
    let stats: SessionStats = serde_json::from_value(body["stats"].clone())?;
    assert!(stats.video.written > 0);

    // Default output lands next to the configured path, named by session
    assert!(temp_dir.path().join("standup.mp4").exists());

    let (status, body) = send(&router, Method::POST, "/sessions/record/stop/standup", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "not_running");

    let (status, body) = send(&router, Method::GET, "/sessions/standup/error", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (status, body) = send(&router, Method::GET, "/sessions", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_invalid_request_is_bad_request() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let router = router_in(&temp_dir);

    let (status, body) = send(
        &router,
        Method::POST,
        "/sessions/record/start",
        Some(json!({ "session_id": "broken", "fps": 0 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_config");

    // Nothing is registered for a rejected request
    let (status, _) = send(&router, Method::GET, "/sessions/broken/status", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_not_found() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let router = router_in(&temp_dir);

    for (method, uri) in [
        (Method::POST, "/sessions/record/stop/missing"),
        (Method::GET, "/sessions/missing/status"),
        (Method::GET, "/sessions/missing/error"),
        (Method::DELETE, "/sessions/missing"),
    ] {
        let (status, body) = send(&router, method, uri, None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["kind"], Value::Null);
    }
    Ok(())
}

#[tokio::test]
async fn test_release_stops_and_forgets_session() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let router = router_in(&temp_dir);
    let output = temp_dir.path().join("released.mp4");

    let (status, _) = send(
        &router,
        Method::POST,
        "/sessions/record/start",
        Some(json!({ "session_id": "short", "output_path": output })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, body) = send(&router, Method::DELETE, "/sessions/short", None).await?;
    assert_eq!(status, StatusCode::OK);
    let stats: SessionStats = serde_json::from_value(body)?;
    assert_eq!(stats.state, SessionState::Stopped);
    assert!(output.exists());

    let (status, _) = send(&router, Method::DELETE, "/sessions/short", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
