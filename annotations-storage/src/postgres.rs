//! PostgreSQL-backed key-value store.
//!
//! Each logical table is a physical table of `(key TEXT PRIMARY KEY,
//! item JSONB)`. Conditional attribute writes are expressed with JSONB
//! concatenation so upserts stay a single statement.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::item::{BatchGetOutput, BatchWriteOutput, Item, ItemUpdate, KeyedItem, WriteRequest};
use crate::traits::{BatchLimits, KeyValueStore};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,255}$").expect("Invalid table name regex"));

/// Key-value store over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgKeyValueStore {
    pool: Pool,
    table: String,
    limits: BatchLimits,
}

impl PgKeyValueStore {
    /// Bind a store to `table`. The name must be 3-255 characters of
    /// letters, digits, `_`, `.` or `-`.
    pub fn new(pool: Pool, table: impl Into<String>) -> StorageResult<Self> {
        let table = table.into();
        if !TABLE_NAME.is_match(&table) {
            return Err(StorageError::InvalidTableName { name: table });
        }
        Ok(Self {
            pool,
            table: format!("\"{}\"", table),
            limits: BatchLimits::default(),
        })
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_table(&self) -> StorageResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, item JSONB NOT NULL)",
            self.table
        ))
        .await?;
        Ok(())
    }
}

fn into_item(key: &str, value: Value) -> StorageResult<Item> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::InvalidItem {
            key: key.to_string(),
            reason: format!("expected a JSON object, found {}", other),
        }),
    }
}

fn keyed_from_row(row: &tokio_postgres::Row) -> StorageResult<KeyedItem> {
    let key: String = row.try_get(0)?;
    let value: Value = row.try_get(1)?;
    let item = into_item(&key, value)?;
    Ok(KeyedItem { key, item })
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    fn limits(&self) -> BatchLimits {
        self.limits
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Item>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                &format!("SELECT item FROM {} WHERE key = $1", self.table),
                &[&key],
            )
            .await?;
        row.map(|row| {
            let value: Value = row.try_get(0)?;
            into_item(key, value)
        })
        .transpose()
    }

    async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput> {
        if keys.len() > self.limits.max_get {
            return Err(StorageError::BatchTooLarge {
                requested: keys.len(),
                limit: self.limits.max_get,
            });
        }
        if keys.is_empty() {
            return Ok(BatchGetOutput::default());
        }

        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                &format!("SELECT key, item FROM {} WHERE key = ANY($1)", self.table),
                &[&keys],
            )
            .await?;
        let items = rows.iter().map(keyed_from_row).collect::<StorageResult<Vec<_>>>()?;

        Ok(BatchGetOutput {
            items,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn put_item(&self, key: &str, item: Item) -> StorageResult<()> {
        let conn = self.pool.get().await?;
        let value = Value::Object(item);
        conn.execute(
            &format!(
                "INSERT INTO {} (key, item) VALUES ($1, $2) \
                 ON CONFLICT (key) DO UPDATE SET item = EXCLUDED.item",
                self.table
            ),
            &[&key, &value],
        )
        .await?;
        Ok(())
    }

    async fn update_item(&self, key: &str, update: ItemUpdate) -> StorageResult<Item> {
        let conn = self.pool.get().await?;
        let set = Value::Object(update.set);
        let set_if_not_exists = Value::Object(update.set_if_not_exists);
        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO {table} (key, item) VALUES ($1, $3::jsonb || $2::jsonb) \
                     ON CONFLICT (key) DO UPDATE \
                     SET item = ($3::jsonb || {table}.item) || $2::jsonb \
                     RETURNING item",
                    table = self.table
                ),
                &[&key, &set, &set_if_not_exists],
            )
            .await?;
        let value: Value = row.try_get(0)?;
        into_item(key, value)
    }

    async fn delete_item(&self, key: &str) -> StorageResult<Option<Item>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                &format!("DELETE FROM {} WHERE key = $1 RETURNING item", self.table),
                &[&key],
            )
            .await?;
        row.map(|row| {
            let value: Value = row.try_get(0)?;
            into_item(key, value)
        })
        .transpose()
    }

    async fn batch_write_item(&self, requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput> {
        if requests.len() > self.limits.max_write {
            return Err(StorageError::BatchTooLarge {
                requested: requests.len(),
                limit: self.limits.max_write,
            });
        }

        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;
        let put = tx
            .prepare(&format!(
                "INSERT INTO {} (key, item) VALUES ($1, $2) \
                 ON CONFLICT (key) DO UPDATE SET item = EXCLUDED.item",
                self.table
            ))
            .await?;
        let delete = tx
            .prepare(&format!("DELETE FROM {} WHERE key = $1", self.table))
            .await?;

        for request in requests {
            match request {
                WriteRequest::Put { key, item } => {
                    let value = Value::Object(item);
                    tx.execute(&put, &[&key, &value]).await?;
                }
                WriteRequest::Delete { key } => {
                    tx.execute(&delete, &[&key]).await?;
                }
            }
        }
        tx.commit().await?;

        Ok(BatchWriteOutput::default())
    }

    async fn query(&self, attribute: &str, value: &Value) -> StorageResult<Vec<KeyedItem>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT key, item FROM {} WHERE item -> $1::text = $2::jsonb ORDER BY key",
                    self.table
                ),
                &[&attribute, value],
            )
            .await?;
        rows.iter().map(keyed_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_pattern() {
        assert!(TABLE_NAME.is_match("annotations_notes"));
        assert!(TABLE_NAME.is_match("Prod-HighlightNotes.v2"));
        assert!(!TABLE_NAME.is_match("ab"));
        assert!(!TABLE_NAME.is_match("notes; DROP TABLE users"));
        assert!(!TABLE_NAME.is_match("notes\"quoted"));
    }
}
