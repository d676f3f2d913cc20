//! Gateway health check.

use axum::{routing::get, Router};

use crate::constants::HEALTH_PATH;

/// Liveness only. Store availability is reported per request.
pub async fn server_health() -> &'static str {
    "ok"
}

/// Create health check router (no identity required)
pub fn create_router() -> Router {
    Router::new().route(HEALTH_PATH, get(server_health))
}
