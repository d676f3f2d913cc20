//! Annotations Storage - Key-Value Store Abstraction
//!
//! Defines the item-oriented key-value store used for highlight notes,
//! an in-process implementation, a PostgreSQL JSONB implementation, and
//! the batch retry client that drives partial-batch operations to
//! completion.

pub mod error;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use item::{
    BatchGetOutput, BatchWriteOutput, Item, ItemUpdate, KeyedItem, WriteRequest,
};
pub use memory::InMemoryKeyValueStore;
pub use postgres::PgKeyValueStore;
pub use retry::{BatchRetryClient, RetryPolicy};
pub use traits::{BatchLimits, KeyValueStore};
