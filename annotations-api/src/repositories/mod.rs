//! Data access for highlights (relational store) and notes (key-value store).

pub mod highlights;
pub mod notes;

pub use highlights::{find_limit_violation, HighlightRepository};
pub use notes::{NoteRepository, NotesTable};

use async_trait::async_trait;

use crate::error::ApiResult;

/// A store that can purge everything a user owns.
#[async_trait]
pub trait UserDataEraser: Send + Sync {
    /// Label used in erasure logs ("Notes", "Highlights").
    fn data_type(&self) -> &'static str;

    /// Remove all of the user's records. Returns how many were removed.
    async fn clear_user_data(&self, user_id: i64, is_premium: bool) -> ApiResult<u64>;
}
