//! Annotations API Server Entry Point
//!
//! Bootstraps configuration, opens the relational pools and the notes
//! table, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use annotations_api::constants::DEFAULT_PORT;
use annotations_api::telemetry::{init_tracer, TelemetryConfig};
use annotations_api::{
    create_api_router, retry_policy_from_env, ApiConfig, ApiError, ApiResult, AppState, DbClient,
    DbConfig, NotesTable, NotesTableConfig,
};
use annotations_storage::PgKeyValueStore;
use axum::Router;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    let notes_config = NotesTableConfig::from_env();
    let store = PgKeyValueStore::new(db.write_pool().clone(), notes_config.name.clone())?;
    store.ensure_table().await?;
    let notes = NotesTable::new(Arc::new(store), retry_policy_from_env(), notes_config);

    let state = AppState::new(db.clone(), notes, api_config);
    let app: Router = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting annotations API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    db.close();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("ANNOTATIONS_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::validation_failed(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation_failed(format!("Invalid bind address {}: {}", addr, e)))
}
