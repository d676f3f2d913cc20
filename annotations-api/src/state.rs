//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::db::DbClient;
use crate::repositories::{NotesTable, UserDataEraser};

/// Process-wide handles, created once at startup.
#[derive(Clone)]
pub struct AppState {
    /// Reader and writer pools for highlights.
    pub db: DbClient,
    /// Notes table behind the batch retry client.
    pub notes: NotesTable,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(db: DbClient, notes: NotesTable, config: ApiConfig) -> Self {
        Self {
            db,
            notes,
            config: Arc::new(config),
        }
    }

    /// Stores purged when a user's data is erased.
    pub fn erasers(&self) -> Vec<Arc<dyn UserDataEraser>> {
        let notes: Arc<dyn UserDataEraser> = Arc::new(self.notes.clone());
        let highlights: Arc<dyn UserDataEraser> = Arc::new(self.db.clone());
        vec![notes, highlights]
    }
}
