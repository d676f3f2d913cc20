//! The key-value store trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::item::{BatchGetOutput, BatchWriteOutput, Item, ItemUpdate, KeyedItem, WriteRequest};

/// Per-call batch size limits of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum keys per batch-get call.
    pub max_get: usize,
    /// Maximum requests per batch-write call.
    pub max_write: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_get: 100,
            max_write: 25,
        }
    }
}

/// A single-table, partition-keyed item store.
///
/// Batch calls may return part of their work as unprocessed; callers that
/// need the whole batch should go through `BatchRetryClient`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Batch size limits enforced by this store.
    fn limits(&self) -> BatchLimits;

    /// Fetch one item.
    async fn get_item(&self, key: &str) -> StorageResult<Option<Item>>;

    /// Fetch up to `limits().max_get` distinct keys.
    async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput>;

    /// Create or replace an item.
    async fn put_item(&self, key: &str, item: Item) -> StorageResult<()>;

    /// Apply an attribute update, creating the item if needed. Returns the
    /// item as stored after the update.
    async fn update_item(&self, key: &str, update: ItemUpdate) -> StorageResult<Item>;

    /// Remove an item, returning it if it existed.
    async fn delete_item(&self, key: &str) -> StorageResult<Option<Item>>;

    /// Apply up to `limits().max_write` puts and deletes.
    async fn batch_write_item(&self, requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput>;

    /// All items whose `attribute` equals `value`.
    async fn query(&self, attribute: &str, value: &Value) -> StorageResult<Vec<KeyedItem>>;
}
