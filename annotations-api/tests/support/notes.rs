#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use annotations_api::{NotesTable, NotesTableConfig};
use annotations_storage::{
    BatchGetOutput, BatchLimits, BatchWriteOutput, InMemoryKeyValueStore, Item, ItemUpdate,
    KeyValueStore, KeyedItem, RetryPolicy, StorageError, StorageResult, WriteRequest,
};
use async_trait::async_trait;
use serde_json::Value;

/// In-memory store that records the size of every batch-get call.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryKeyValueStore,
    batch_gets: Mutex<Vec<usize>>,
}

impl CountingStore {
    pub fn batch_gets(&self) -> Vec<usize> {
        self.batch_gets.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    fn limits(&self) -> BatchLimits {
        self.inner.limits()
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.get_item(key).await
    }

    async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput> {
        if let Ok(mut calls) = self.batch_gets.lock() {
            calls.push(keys.len());
        }
        self.inner.batch_get_item(keys).await
    }

    async fn put_item(&self, key: &str, item: Item) -> StorageResult<()> {
        self.inner.put_item(key, item).await
    }

    async fn update_item(&self, key: &str, update: ItemUpdate) -> StorageResult<Item> {
        self.inner.update_item(key, update).await
    }

    async fn delete_item(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.delete_item(key).await
    }

    async fn batch_write_item(&self, requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput> {
        self.inner.batch_write_item(requests).await
    }

    async fn query(&self, attribute: &str, value: &Value) -> StorageResult<Vec<KeyedItem>> {
        self.inner.query(attribute, value).await
    }
}

/// In-memory store whose batch calls can be made to fail. Single-item calls
/// always go through.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryKeyValueStore,
    fail_batch_gets: bool,
    batch_writes_left: Option<AtomicUsize>,
}

impl FaultyStore {
    /// Every batch get fails.
    pub fn failing_batch_gets() -> Self {
        Self {
            fail_batch_gets: true,
            ..Self::default()
        }
    }

    /// The first `ok` batch writes succeed, every later one fails.
    pub fn failing_batch_writes_after(ok: usize) -> Self {
        Self {
            batch_writes_left: Some(AtomicUsize::new(ok)),
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    fn backend_down() -> StorageError {
        StorageError::Backend {
            reason: "store unavailable".to_string(),
        }
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    fn limits(&self) -> BatchLimits {
        self.inner.limits()
    }

    async fn get_item(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.get_item(key).await
    }

    async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput> {
        if self.fail_batch_gets {
            return Err(Self::backend_down());
        }
        self.inner.batch_get_item(keys).await
    }

    async fn put_item(&self, key: &str, item: Item) -> StorageResult<()> {
        self.inner.put_item(key, item).await
    }

    async fn update_item(&self, key: &str, update: ItemUpdate) -> StorageResult<Item> {
        self.inner.update_item(key, update).await
    }

    async fn delete_item(&self, key: &str) -> StorageResult<Option<Item>> {
        self.inner.delete_item(key).await
    }

    async fn batch_write_item(&self, requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput> {
        if let Some(left) = &self.batch_writes_left {
            let allowed = left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(Self::backend_down());
            }
        }
        self.inner.batch_write_item(requests).await
    }

    async fn query(&self, attribute: &str, value: &Value) -> StorageResult<Vec<KeyedItem>> {
        self.inner.query(attribute, value).await
    }
}

pub fn notes_table(store: Arc<dyn KeyValueStore>) -> NotesTable {
    NotesTable::new(store, RetryPolicy::default(), NotesTableConfig::default())
}
