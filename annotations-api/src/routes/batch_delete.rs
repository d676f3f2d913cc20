//! Batch Delete Routes
//!
//! Side channel used by account deletion. A valid request is acknowledged
//! immediately; the user's notes and highlights are then purged by
//! independent background tasks whose outcomes are only logged.
//!
//! Endpoints:
//! - POST /queueDelete
//! - POST /batchDelete

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::repositories::UserDataEraser;

// ============================================================================
// REQUEST VALIDATION
// ============================================================================

/// A validated erasure request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDeleteRequest {
    pub user_id: i64,
    pub is_premium: bool,
    pub trace_id: Option<String>,
}

/// One rejected body field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub location: &'static str,
    pub param: &'static str,
    pub msg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    fn body(param: &'static str, msg: &'static str, value: Option<&Value>) -> Self {
        Self {
            location: "body",
            param,
            msg,
            value: value.cloned(),
        }
    }
}

fn parse_user_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_premium(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Check `userId`, `isPremium` and the optional `traceId`, collecting every
/// failure.
pub fn validate(body: &Value) -> Result<BatchDeleteRequest, Vec<FieldError>> {
    let mut errors = Vec::new();

    let user_value = body.get("userId");
    let user_id = user_value.and_then(parse_user_id);
    if user_id.is_none() {
        errors.push(FieldError::body("userId", "Must provide valid userId", user_value));
    }

    let premium_value = body.get("isPremium");
    let is_premium = premium_value.and_then(parse_premium);
    if is_premium.is_none() {
        errors.push(FieldError::body(
            "isPremium",
            "Must provide premium status",
            premium_value,
        ));
    }

    let trace_id = match body.get("traceId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(other) => {
            errors.push(FieldError::body("traceId", "Invalid value", Some(other)));
            None
        }
    };

    match (user_id, is_premium) {
        (Some(user_id), Some(is_premium)) if errors.is_empty() => Ok(BatchDeleteRequest {
            user_id,
            is_premium,
            trace_id,
        }),
        _ => Err(errors),
    }
}

/// Time-ordered id for requests that carry no trace id.
pub fn generate_request_id() -> String {
    Uuid::now_v7().to_string()
}

// ============================================================================
// ERASURE
// ============================================================================

/// Start one background purge per store. Each reports on its own.
pub fn spawn_erasure(
    erasers: &[Arc<dyn UserDataEraser>],
    user_id: i64,
    is_premium: bool,
    trace_id: &str,
) {
    for eraser in erasers {
        let eraser = Arc::clone(eraser);
        let trace_id = trace_id.to_string();
        tokio::spawn(async move {
            let data_type = eraser.data_type();
            match eraser.clear_user_data(user_id, is_premium).await {
                Ok(removed) => tracing::info!(
                    user_id,
                    trace_id = %trace_id,
                    removed,
                    "BatchDelete: {} deletion completed for userId={}, traceId={}",
                    data_type,
                    user_id,
                    trace_id
                ),
                Err(err) => tracing::error!(
                    user_id,
                    trace_id = %trace_id,
                    error = %err,
                    "BatchDelete: Error = Failed to delete {} for userId={}, traceId={}",
                    data_type,
                    user_id,
                    trace_id
                ),
            }
        });
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Clone)]
pub struct BatchDeleteState {
    erasers: Arc<Vec<Arc<dyn UserDataEraser>>>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub status: &'static str,
    pub message: String,
}

/// Validate, acknowledge, and erase in the background.
pub async fn batch_delete(State(state): State<BatchDeleteState>, body: Bytes) -> Response {
    let payload: Value =
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Default::default()));

    let request = match validate(&payload) {
        Ok(request) => request,
        Err(errors) => {
            tracing::info!(errors = errors.len(), "BatchDelete: rejected request body");
            return (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response();
        }
    };

    let request_id = request.trace_id.unwrap_or_else(generate_request_id);
    spawn_erasure(&state.erasers, request.user_id, request.is_premium, &request_id);

    Json(BatchDeleteResponse {
        status: "OK",
        message: format!(
            "BatchDelete: Deleting highlights and notes for userId={} (requestId='{}')",
            request.user_id, request_id
        ),
    })
    .into_response()
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router(erasers: Vec<Arc<dyn UserDataEraser>>) -> Router {
    let state = BatchDeleteState {
        erasers: Arc::new(erasers),
    };

    Router::new()
        .route("/queueDelete", post(batch_delete))
        .route("/batchDelete", post(batch_delete))
        .with_state(state)
}
