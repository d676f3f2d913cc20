//! Item and request types shared by every key-value store.

use serde_json::{Map, Value};

/// A stored item: a flat map of attribute name to JSON value.
pub type Item = Map<String, Value>;

/// An item paired with the partition key it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedItem {
    pub key: String,
    pub item: Item,
}

impl KeyedItem {
    pub fn new(key: impl Into<String>, item: Item) -> Self {
        Self {
            key: key.into(),
            item,
        }
    }
}

/// Attribute changes applied by `KeyValueStore::update_item`.
///
/// `set` attributes always overwrite; `set_if_not_exists` attributes are
/// only written when the stored item lacks them (or the item is new).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub set: Item,
    pub set_if_not_exists: Item,
}

impl ItemUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an attribute unconditionally.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    /// Write an attribute only when it is absent.
    pub fn set_if_not_exists(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_if_not_exists.insert(name.into(), value.into());
        self
    }

    /// Resolve the update against an optional existing item.
    pub fn apply(&self, existing: Option<&Item>) -> Item {
        let mut merged = self.set_if_not_exists.clone();
        if let Some(existing) = existing {
            for (name, value) in existing {
                merged.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.set {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

/// One entry of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put { key: String, item: Item },
    Delete { key: String },
}

impl WriteRequest {
    pub fn key(&self) -> &str {
        match self {
            WriteRequest::Put { key, .. } | WriteRequest::Delete { key } => key,
        }
    }
}

/// Result of a single batch-get call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found, in no particular order. Missing keys are simply absent.
    pub items: Vec<KeyedItem>,
    /// Keys the store did not get to in this call.
    pub unprocessed_keys: Vec<String>,
}

/// Result of a single batch-write call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
}
