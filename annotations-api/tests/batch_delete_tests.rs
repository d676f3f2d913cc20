//! Batch-delete route: validation, acknowledgement and independent erasure.

use std::sync::Arc;
use std::time::Duration;

use annotations_api::routes::batch_delete::create_router;
use annotations_api::{ApiError, ApiResult, UserDataEraser};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Reports every call on a channel, optionally failing afterwards.
struct RecordingEraser {
    data_type: &'static str,
    fail: bool,
    calls: mpsc::UnboundedSender<(&'static str, i64, bool)>,
}

#[async_trait]
impl UserDataEraser for RecordingEraser {
    fn data_type(&self) -> &'static str {
        self.data_type
    }

    async fn clear_user_data(&self, user_id: i64, is_premium: bool) -> ApiResult<u64> {
        let _ = self.calls.send((self.data_type, user_id, is_premium));
        if self.fail {
            Err(ApiError::database_error("does not compute"))
        } else {
            Ok(1)
        }
    }
}

fn router(fail_highlights: bool) -> (Router, mpsc::UnboundedReceiver<(&'static str, i64, bool)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let erasers: Vec<Arc<dyn UserDataEraser>> = vec![
        Arc::new(RecordingEraser {
            data_type: "Notes",
            fail: false,
            calls: tx.clone(),
        }),
        Arc::new(RecordingEraser {
            data_type: "Highlights",
            fail: fail_highlights,
            calls: tx,
        }),
    ];
    (create_router(erasers), rx)
}

async fn post(app: Router, uri: &str, body: Value) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

async fn received(rx: &mut mpsc::UnboundedReceiver<(&'static str, i64, bool)>, n: usize) -> Vec<(&'static str, i64, bool)> {
    let mut calls = Vec::new();
    for _ in 0..n {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(call)) => calls.push(call),
            _ => break,
        }
    }
    calls.sort();
    calls
}

#[tokio::test]
async fn test_valid_request_is_acknowledged_and_erases_both_stores() -> TestResult {
    let (app, mut rx) = router(false);
    let (status, body) = post(
        app,
        "/batchDelete",
        json!({ "userId": 123, "isPremium": true, "traceId": "abc-123" }),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(
        body["message"],
        "BatchDelete: Deleting highlights and notes for userId=123 (requestId='abc-123')"
    );
    assert_eq!(
        received(&mut rx, 2).await,
        vec![("Highlights", 123, true), ("Notes", 123, true)]
    );
    Ok(())
}

#[tokio::test]
async fn test_failing_store_does_not_stop_the_other() -> TestResult {
    let (app, mut rx) = router(true);
    let (status, _) = post(app, "/queueDelete", json!({ "userId": "9", "isPremium": "false" })).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        received(&mut rx, 2).await,
        vec![("Highlights", 9, false), ("Notes", 9, false)]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_trace_id_gets_generated_request_id() -> TestResult {
    let (app, _rx) = router(false);
    let (_, body) = post(app, "/batchDelete", json!({ "userId": 5, "isPremium": false })).await?;

    let message = body["message"].as_str().unwrap_or_default();
    let prefix = "BatchDelete: Deleting highlights and notes for userId=5 (requestId='";
    assert!(message.starts_with(prefix));
    let request_id = message.trim_start_matches(prefix).trim_end_matches("')");
    let version = uuid::Uuid::parse_str(request_id).map(|id| id.get_version_num());
    assert_eq!(version, Ok(7));
    Ok(())
}

#[tokio::test]
async fn test_invalid_body_is_rejected_without_erasure() -> TestResult {
    let (app, mut rx) = router(false);
    let (status, body) = post(app, "/batchDelete", json!({ "userId": "abc" })).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let params: Vec<&str> = body["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["param"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(params, vec!["userId", "isPremium"]);
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_unparseable_body_is_rejected() -> TestResult {
    let (app, _rx) = router(false);
    let request = Request::builder()
        .method("POST")
        .uri("/batchDelete")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
