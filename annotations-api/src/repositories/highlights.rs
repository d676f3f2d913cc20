//! Highlight Repository
//!
//! CRUD over `user_annotations` for one caller. Reads use the reader pool;
//! every mutation runs in one writer transaction that also marks the saved
//! item as updated in `list` and refreshes the caller's `users_meta`
//! account entry. Non-premium callers are held to a per-item quota of
//! active highlights.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use tokio_postgres::{error::SqlState, Row};
use uuid::Uuid;

use crate::constants::{ACCOUNT_PROPERTY, LEDGER_TIME_FORMAT, STATUS_ACTIVE, STATUS_DELETED};
use crate::context::Identity;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::repositories::UserDataEraser;
use crate::types::{HighlightInput, HighlightRecord, NewHighlight};

const HIGHLIGHT_COLUMNS: &str =
    "annotation_id, user_id, item_id, quote, patch, version, status, created_at, updated_at";

const COUNT_ACTIVE_BY_ITEM: &str = "SELECT item_id, COUNT(*) AS highlights FROM user_annotations \
     WHERE user_id = $1 AND status = $2 AND item_id = ANY($3) \
     GROUP BY item_id";

// ============================================================================
// QUOTA
// ============================================================================

/// First item id, in input order, whose existing plus requested highlights
/// exceed `limit`. The whole batch counts toward each item before any
/// comparison is made.
pub fn find_limit_violation(
    existing: &HashMap<i64, i64>,
    requested_items: &[i64],
    limit: usize,
) -> Option<i64> {
    let mut requested: HashMap<i64, i64> = HashMap::new();
    for item_id in requested_items {
        *requested.entry(*item_id).or_insert(0) += 1;
    }

    requested_items.iter().copied().find(|item_id| {
        let total = existing.get(item_id).copied().unwrap_or(0)
            + requested.get(item_id).copied().unwrap_or(0);
        total > limit as i64
    })
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// Highlight access scoped to one caller.
#[derive(Clone)]
pub struct HighlightRepository {
    db: DbClient,
    identity: Identity,
    limit: usize,
}

impl HighlightRepository {
    pub fn new(db: DbClient, identity: Identity, limit: usize) -> Self {
        Self {
            db,
            identity,
            limit,
        }
    }

    fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    /// Active highlights on one of the caller's saved items.
    pub async fn get_highlights_by_item_id(&self, item_id: i64) -> ApiResult<Vec<HighlightRecord>> {
        let conn = self.db.reader().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM user_annotations \
                     WHERE item_id = $1 AND user_id = $2 AND status = $3 \
                     ORDER BY created_at, annotation_id",
                    HIGHLIGHT_COLUMNS
                ),
                &[&item_id, &self.user_id(), &STATUS_ACTIVE],
            )
            .await?;
        rows.iter().map(HighlightRecord::try_from).collect()
    }

    /// One active highlight owned by the caller, or NotFound.
    pub async fn get_highlight_by_id(&self, id: &str) -> ApiResult<HighlightRecord> {
        let conn = self.db.reader().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM user_annotations \
                     WHERE annotation_id = $1 AND user_id = $2 AND status = $3",
                    HIGHLIGHT_COLUMNS
                ),
                &[&id, &self.user_id(), &STATUS_ACTIVE],
            )
            .await?;
        match row {
            Some(row) => HighlightRecord::try_from(&row),
            None => Err(ApiError::not_found()),
        }
    }

    /// Active highlight counts per item, for the caller only. Items without
    /// highlights are absent.
    pub async fn highlights_count_by_item_ids(&self, item_ids: &[i64]) -> ApiResult<HashMap<i64, i64>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.db.reader().await?;
        let rows = conn
            .query(COUNT_ACTIVE_BY_ITEM, &[&self.user_id(), &STATUS_ACTIVE, &item_ids])
            .await?;
        counts_from_rows(&rows)
    }

    /// BadUserInput naming the first item the batch would push over quota.
    /// Counts are read inside `tx` after taking the caller's advisory lock,
    /// so concurrent creates by one user are checked one after another.
    async fn check_highlight_limit(
        &self,
        tx: &Transaction<'_>,
        inputs: &[NewHighlight],
    ) -> ApiResult<()> {
        let requested: Vec<i64> = inputs.iter().map(|h| h.input.item_id).collect();
        let mut distinct = requested.clone();
        distinct.sort_unstable();
        distinct.dedup();

        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&self.user_id()])
            .await?;
        let rows = tx
            .query(COUNT_ACTIVE_BY_ITEM, &[&self.user_id(), &STATUS_ACTIVE, &distinct])
            .await?;
        let existing = counts_from_rows(&rows)?;
        match find_limit_violation(&existing, &requested, self.limit) {
            Some(item_id) => {
                tracing::info!(user_id = self.user_id(), item_id, "Highlight quota exceeded");
                Err(ApiError::bad_user_input(format!(
                    "Too many highlights for itemId: {}",
                    item_id
                )))
            }
            None => Ok(()),
        }
    }

    /// Insert highlights atomically. Non-premium callers are quota-checked
    /// in the same transaction. Returns the inserted rows in input order.
    pub async fn create_highlight(&self, inputs: &[NewHighlight]) -> ApiResult<Vec<HighlightRecord>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut conn = self.db.writer().await?;
        let tx = conn.transaction().await?;
        if !self.identity.is_premium {
            self.check_highlight_limit(&tx, inputs).await?;
        }
        let insert = tx
            .prepare(&format!(
                "INSERT INTO user_annotations ({}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
                 RETURNING {}",
                HIGHLIGHT_COLUMNS, HIGHLIGHT_COLUMNS
            ))
            .await?;

        let mut created = Vec::with_capacity(inputs.len());
        for highlight in inputs {
            let id = highlight
                .id
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string());
            let row = tx
                .query_one(
                    &insert,
                    &[
                        &id,
                        &self.user_id(),
                        &highlight.input.item_id,
                        &highlight.input.quote,
                        &highlight.input.patch,
                        &highlight.input.version,
                        &STATUS_ACTIVE,
                        &now,
                    ],
                )
                .await
                .map_err(|err| duplicate_id_or(err, &id))?;
            created.push(HighlightRecord::try_from(&row)?);
        }

        let item_ids: Vec<i64> = inputs.iter().map(|h| h.input.item_id).collect();
        self.record_mutation(&tx, &item_ids, now).await?;
        tx.commit().await?;

        tracing::debug!(user_id = self.user_id(), count = created.len(), "Created highlights");
        Ok(created)
    }

    /// Update an active highlight owned by the caller and return the
    /// updated row. NotFound leaves the store unchanged.
    pub async fn update_highlights_by_id(
        &self,
        id: &str,
        input: &HighlightInput,
    ) -> ApiResult<HighlightRecord> {
        let now = Utc::now();
        let mut conn = self.db.writer().await?;
        let tx = conn.transaction().await?;
        let row = tx
            .query_opt(
                &format!(
                    "UPDATE user_annotations \
                     SET quote = $1, patch = $2, version = $3, item_id = $4, updated_at = $5 \
                     WHERE annotation_id = $6 AND user_id = $7 AND status = $8 \
                     RETURNING {}",
                    HIGHLIGHT_COLUMNS
                ),
                &[
                    &input.quote,
                    &input.patch,
                    &input.version,
                    &input.item_id,
                    &now,
                    &id,
                    &self.user_id(),
                    &STATUS_ACTIVE,
                ],
            )
            .await?;
        let updated = match row {
            Some(row) => HighlightRecord::try_from(&row)?,
            None => return Err(ApiError::not_found()),
        };

        self.record_mutation(&tx, &[updated.item_id], now).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Soft-delete an active highlight owned by the caller. Returns the id.
    pub async fn delete_highlight_by_id(&self, id: &str) -> ApiResult<String> {
        let now = Utc::now();
        let mut conn = self.db.writer().await?;
        let tx = conn.transaction().await?;
        let row = tx
            .query_opt(
                "UPDATE user_annotations SET status = $1, updated_at = $2 \
                 WHERE annotation_id = $3 AND user_id = $4 AND status = $5 \
                 RETURNING item_id",
                &[&STATUS_DELETED, &now, &id, &self.user_id(), &STATUS_ACTIVE],
            )
            .await?;
        let item_id: i64 = match row {
            Some(row) => row.try_get("item_id")?,
            None => return Err(ApiError::not_found()),
        };

        self.record_mutation(&tx, &[item_id], now).await?;
        tx.commit().await?;
        Ok(id.to_string())
    }

    /// Soft-delete highlights created earlier in the same request. Used to
    /// undo a create whose note write failed.
    pub async fn discard_created(&self, ids: &[String]) -> ApiResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let conn = self.db.writer().await?;
        let discarded = conn
            .execute(
                "UPDATE user_annotations SET status = $1, updated_at = $2 \
                 WHERE annotation_id = ANY($3) AND user_id = $4",
                &[&STATUS_DELETED, &now, &ids, &self.user_id()],
            )
            .await?;
        Ok(discarded)
    }

    /// Hard-delete every highlight the user has, active or not.
    pub async fn clear_user_data(&self) -> ApiResult<u64> {
        let conn = self.db.writer().await?;
        let removed = conn
            .execute(
                "DELETE FROM user_annotations WHERE user_id = $1",
                &[&self.user_id()],
            )
            .await?;
        Ok(removed)
    }

    async fn record_mutation(
        &self,
        tx: &Transaction<'_>,
        item_ids: &[i64],
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        let mut item_ids = item_ids.to_vec();
        item_ids.sort_unstable();
        item_ids.dedup();

        tx.execute(
            "UPDATE list SET time_updated = $1 WHERE user_id = $2 AND item_id = ANY($3)",
            &[&now, &self.user_id(), &item_ids],
        )
        .await?;

        let value = now.format(LEDGER_TIME_FORMAT).to_string();
        tx.execute(
            "INSERT INTO users_meta (user_id, property, value, time_updated) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, property) \
             DO UPDATE SET value = EXCLUDED.value, time_updated = EXCLUDED.time_updated",
            &[&self.user_id(), &ACCOUNT_PROPERTY, &value, &now],
        )
        .await?;
        Ok(())
    }
}

fn counts_from_rows(rows: &[Row]) -> ApiResult<HashMap<i64, i64>> {
    rows.iter()
        .map(|row| -> ApiResult<(i64, i64)> {
            Ok((row.try_get("item_id")?, row.try_get("highlights")?))
        })
        .collect()
}

fn duplicate_id_or(err: tokio_postgres::Error, id: &str) -> ApiError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        ApiError::bad_user_input(format!("Highlight id {} already exists", id))
    } else {
        err.into()
    }
}

#[async_trait]
impl UserDataEraser for DbClient {
    fn data_type(&self) -> &'static str {
        "Highlights"
    }

    async fn clear_user_data(&self, user_id: i64, is_premium: bool) -> ApiResult<u64> {
        HighlightRepository::new(self.clone(), Identity::service(user_id, is_premium), 0)
            .clear_user_data()
            .await
    }
}
