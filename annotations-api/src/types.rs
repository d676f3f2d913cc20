//! Domain records shared by repositories and resolvers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// HIGHLIGHTS
// ============================================================================

/// A row of `user_annotations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub id: String,
    pub user_id: i64,
    pub item_id: i64,
    pub quote: String,
    pub patch: String,
    pub version: i32,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&tokio_postgres::Row> for HighlightRecord {
    type Error = ApiError;

    fn try_from(row: &tokio_postgres::Row) -> ApiResult<Self> {
        Ok(Self {
            id: row.try_get("annotation_id")?,
            user_id: row.try_get("user_id")?,
            item_id: row.try_get("item_id")?,
            quote: row.try_get("quote")?,
            patch: row.try_get("patch")?,
            version: row.try_get("version")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Mutable highlight fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightInput {
    pub item_id: i64,
    pub quote: String,
    pub patch: String,
    pub version: i32,
}

/// A highlight to insert, optionally with a caller-chosen id and a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHighlight {
    pub id: Option<String>,
    pub input: HighlightInput,
    pub note: Option<String>,
}

// ============================================================================
// NOTES
// ============================================================================

/// A note attached to one highlight. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub highlight_id: String,
    pub text: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A note to write alongside a newly created highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub highlight_id: String,
    pub text: String,
}
