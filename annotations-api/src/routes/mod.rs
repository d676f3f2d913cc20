//! HTTP routes: the GraphQL subgraph, the gateway health check and the
//! batch-delete side channel.

pub mod batch_delete;
pub mod graphql;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::constants::{API_ID_HEADER, PREMIUM_HEADER, USER_ID_HEADER};
use crate::state::AppState;

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(PREMIUM_HEADER),
            HeaderName::from_static(API_ID_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete service router:
/// - GraphQL at `/graphql` and `/`
/// - Health check at `/.well-known/apollo/server-health`
/// - Erasure at `/queueDelete` and `/batchDelete`
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let erasers = state.erasers();

    Router::new()
        .merge(graphql::create_router(state))
        .merge(health::create_router())
        .merge(batch_delete::create_router(erasers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
