//! In-process key-value store.
//!
//! Honors the same partial-batch contract as a managed store: requests over
//! the batch limit are rejected, and an optional per-call throughput cap
//! hands the remainder of a batch back as unprocessed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::item::{BatchGetOutput, BatchWriteOutput, Item, ItemUpdate, KeyedItem, WriteRequest};
use crate::traits::{BatchLimits, KeyValueStore};

/// Key-value store backed by a `HashMap` behind a tokio `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    items: RwLock<HashMap<String, Item>>,
    limits: BatchLimits,
    throughput: Option<usize>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the batch size limits.
    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Process at most `per_call` entries of each batch call.
    pub fn with_throughput(mut self, per_call: usize) -> Self {
        self.throughput = Some(per_call.max(1));
        self
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn split_point(&self, requested: usize) -> usize {
        self.throughput.map_or(requested, |cap| cap.min(requested))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    fn limits(&self) -> BatchLimits {
        self.limits
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Item>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput> {
        if keys.len() > self.limits.max_get {
            return Err(StorageError::BatchTooLarge {
                requested: keys.len(),
                limit: self.limits.max_get,
            });
        }

        let (processed, unprocessed) = keys.split_at(self.split_point(keys.len()));
        let items = self.items.read().await;
        let found = processed
            .iter()
            .filter_map(|key| items.get(key).map(|item| KeyedItem::new(key.clone(), item.clone())))
            .collect();

        Ok(BatchGetOutput {
            items: found,
            unprocessed_keys: unprocessed.to_vec(),
        })
    }

    async fn put_item(&self, key: &str, item: Item) -> StorageResult<()> {
        self.items.write().await.insert(key.to_string(), item);
        Ok(())
    }

    async fn update_item(&self, key: &str, update: ItemUpdate) -> StorageResult<Item> {
        let mut items = self.items.write().await;
        let merged = update.apply(items.get(key));
        items.insert(key.to_string(), merged.clone());
        Ok(merged)
    }

    async fn delete_item(&self, key: &str) -> StorageResult<Option<Item>> {
        Ok(self.items.write().await.remove(key))
    }

    async fn batch_write_item(&self, mut requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput> {
        if requests.len() > self.limits.max_write {
            return Err(StorageError::BatchTooLarge {
                requested: requests.len(),
                limit: self.limits.max_write,
            });
        }

        let unprocessed = requests.split_off(self.split_point(requests.len()));
        let mut items = self.items.write().await;
        for request in requests {
            match request {
                WriteRequest::Put { key, item } => {
                    items.insert(key, item);
                }
                WriteRequest::Delete { key } => {
                    items.remove(&key);
                }
            }
        }

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn query(&self, attribute: &str, value: &Value) -> StorageResult<Vec<KeyedItem>> {
        let items = self.items.read().await;
        let mut matches: Vec<KeyedItem> = items
            .iter()
            .filter(|(_, item)| item.get(attribute) == Some(value))
            .map(|(key, item)| KeyedItem::new(key.clone(), item.clone()))
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(matches)
    }
}
