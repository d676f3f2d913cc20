//! Note Repository
//!
//! Notes live in the key-value store, one item per highlight id. Reads and
//! writes for a request go through `NoteRepository`, which can only be built
//! for a premium identity. The shared `NotesTable` handle also serves the
//! erasure path, which is not tied to a request.

use std::collections::HashMap;
use std::sync::Arc;

use annotations_storage::{
    BatchRetryClient, Item, ItemUpdate, KeyValueStore, RetryPolicy, WriteRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::NotesTableConfig;
use crate::context::Identity;
use crate::error::{ApiError, ApiResult};
use crate::repositories::UserDataEraser;
use crate::types::{NewNote, NoteRecord};

// ============================================================================
// NOTES TABLE
// ============================================================================

/// Process-wide handle to the notes table.
#[derive(Clone)]
pub struct NotesTable {
    client: BatchRetryClient,
    config: Arc<NotesTableConfig>,
}

impl NotesTable {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy, config: NotesTableConfig) -> Self {
        Self {
            client: BatchRetryClient::new(store, policy),
            config: Arc::new(config),
        }
    }

    fn to_record(&self, key: &str, item: &Item) -> ApiResult<NoteRecord> {
        let text = item.get(&self.config.note).and_then(Value::as_str);
        let created_at = item.get(&self.config.created_at).and_then(Value::as_i64);
        let updated_at = item.get(&self.config.updated_at).and_then(Value::as_i64);

        match (text, created_at, updated_at) {
            (Some(text), Some(created_at), Some(updated_at)) => Ok(NoteRecord {
                highlight_id: key.to_string(),
                text: text.to_string(),
                created_at,
                updated_at,
            }),
            _ => {
                tracing::error!(highlight_id = key, "Malformed note item");
                Err(ApiError::storage_error(format!(
                    "Malformed note for highlight {}",
                    key
                )))
            }
        }
    }

    fn new_item(&self, highlight_id: &str, text: &str, user_id: i64, now: i64) -> Item {
        let mut item = Item::new();
        item.insert(self.config.key.clone(), json!(highlight_id));
        item.insert(self.config.note.clone(), json!(text));
        item.insert(self.config.user_id.clone(), json!(user_id));
        item.insert(self.config.created_at.clone(), json!(now));
        item.insert(self.config.updated_at.clone(), json!(now));
        item
    }

    /// Delete every note owned by `user_id`. Returns the number removed.
    pub async fn clear_user_data(&self, user_id: i64) -> ApiResult<u64> {
        let owned = self
            .client
            .store()
            .query(&self.config.user_id, &json!(user_id))
            .await?;
        let count = owned.len() as u64;
        if count == 0 {
            return Ok(0);
        }

        let deletes = owned
            .into_iter()
            .map(|keyed| WriteRequest::Delete { key: keyed.key })
            .collect();
        self.client.write_all(deletes).await?;
        Ok(count)
    }
}

#[async_trait]
impl UserDataEraser for NotesTable {
    fn data_type(&self) -> &'static str {
        "Notes"
    }

    async fn clear_user_data(&self, user_id: i64, _is_premium: bool) -> ApiResult<u64> {
        NotesTable::clear_user_data(self, user_id).await
    }
}

// ============================================================================
// NOTE REPOSITORY
// ============================================================================

/// Note access for one premium caller.
#[derive(Clone)]
pub struct NoteRepository {
    table: NotesTable,
    user_id: i64,
}

impl NoteRepository {
    /// Fails with Forbidden for non-premium identities, before any store
    /// access.
    pub fn new(table: NotesTable, identity: &Identity) -> ApiResult<Self> {
        identity.require_premium()?;
        Ok(Self {
            table,
            user_id: identity.user_id,
        })
    }

    /// The note for a highlight, if any.
    pub async fn get(&self, id: &str) -> ApiResult<Option<NoteRecord>> {
        let item = self.table.client.store().get_item(id).await?;
        item.map(|item| self.table.to_record(id, &item)).transpose()
    }

    /// Notes keyed by highlight id. Ids without a note are absent.
    pub async fn fetch(&self, ids: &[String]) -> ApiResult<HashMap<String, NoteRecord>> {
        let found = self.table.client.get_all(ids).await?;
        found
            .into_iter()
            .map(|keyed| -> ApiResult<(String, NoteRecord)> {
                let record = self.table.to_record(&keyed.key, &keyed.item)?;
                Ok((keyed.key, record))
            })
            .collect()
    }

    /// Notes aligned with `ids`: same length and order, `None` where a
    /// highlight has no note.
    pub async fn get_many(&self, ids: &[String]) -> ApiResult<Vec<Option<NoteRecord>>> {
        let found = self.fetch(ids).await?;
        Ok(crate::loader::order_by_keys(ids, &found))
    }

    /// Write a new note, stamping both timestamps with the current time.
    pub async fn create(&self, id: &str, text: &str) -> ApiResult<NoteRecord> {
        let now = Utc::now().timestamp();
        let item = self.table.new_item(id, text, self.user_id, now);
        self.table.client.store().put_item(id, item).await?;
        Ok(NoteRecord {
            highlight_id: id.to_string(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Create or overwrite a note. The creation time of an existing note is
    /// kept.
    pub async fn upsert(&self, id: &str, text: &str) -> ApiResult<NoteRecord> {
        let now = Utc::now().timestamp();
        let config = &self.table.config;
        let update = ItemUpdate::new()
            .set(config.key.clone(), id)
            .set(config.note.clone(), text)
            .set(config.user_id.clone(), self.user_id)
            .set(config.updated_at.clone(), now)
            .set_if_not_exists(config.created_at.clone(), now);

        let stored = self.table.client.store().update_item(id, update).await?;
        self.table.to_record(id, &stored)
    }

    /// Write several notes as one batched operation.
    pub async fn batch_create(&self, notes: Vec<NewNote>) -> ApiResult<Vec<NoteRecord>> {
        let now = Utc::now().timestamp();
        let mut records = Vec::with_capacity(notes.len());
        let mut writes = Vec::with_capacity(notes.len());
        for note in notes {
            let item = self.table.new_item(&note.highlight_id, &note.text, self.user_id, now);
            writes.push(WriteRequest::Put {
                key: note.highlight_id.clone(),
                item,
            });
            records.push(NoteRecord {
                highlight_id: note.highlight_id,
                text: note.text,
                created_at: now,
                updated_at: now,
            });
        }

        self.table.client.write_all(writes).await?;
        Ok(records)
    }

    /// Remove notes one item at a time, skipping ids that have none.
    /// Returns how many were removed. Used to undo a batch write that
    /// failed part way.
    pub async fn discard(&self, ids: &[String]) -> ApiResult<usize> {
        let mut removed = 0;
        for id in ids {
            if self.table.client.store().delete_item(id).await?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove a note. NotFound when there was nothing to remove.
    pub async fn delete(&self, id: &str) -> ApiResult<String> {
        match self.table.client.store().delete_item(id).await? {
            Some(_) => Ok(id.to_string()),
            None => Err(ApiError::not_found()),
        }
    }
}
