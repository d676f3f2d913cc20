//! Annotations API - GraphQL subgraph for saved-item highlights and notes.
//!
//! Highlights are rows in PostgreSQL, read through a reader pool and
//! written through a writer pool. Notes are items in a key-value table
//! reached through the batch retry client of `annotations-storage`, and
//! are premium only. A per-request DataLoader batches note lookups made
//! while resolving one operation.

pub mod config;
pub mod constants;
pub mod context;
pub mod db;
pub mod error;
pub mod loader;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{retry_policy_from_env, ApiConfig, NotesTableConfig};
pub use context::{Identity, RequestContext};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use loader::NotesLoader;
pub use repositories::{HighlightRepository, NoteRepository, NotesTable, UserDataEraser};
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;
