//! Batch retry client.
//!
//! Drives batch-get and batch-write calls to completion. Requests are split
//! into chunks that fit the store's batch limits; whatever a call hands back
//! as unprocessed is resubmitted after a capped exponential backoff with full
//! jitter. Every chunk gets at most `max_attempts` calls.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{StorageError, StorageResult};
use crate::item::{KeyedItem, WriteRequest};
use crate::traits::KeyValueStore;

/// Backoff and termination settings for batch retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff ceiling for the first retry round, doubled each round.
    pub base_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
    /// Maximum store calls per chunk, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(3000),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// `min(max_delay, base_delay * 2^attempt)`, saturating.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Full jitter: uniform in `[0, backoff_ceiling(attempt)]` at millisecond
    /// resolution.
    pub fn full_jitter_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rng.random_range(0..=ceiling))
    }
}

/// Wraps a `KeyValueStore` and retries partial batches.
#[derive(Clone)]
pub struct BatchRetryClient {
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl BatchRetryClient {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The wrapped store, for single-item operations.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.policy.full_jitter_delay(attempt, &mut rand::rng());
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before batch retry");
        tokio::time::sleep(delay).await;
    }

    /// Fetch every key, retrying unprocessed keys. Duplicate keys are
    /// fetched once; missing keys are absent from the result.
    pub async fn get_all(&self, keys: &[String]) -> StorageResult<Vec<KeyedItem>> {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();

        let chunk_size = self.store.limits().max_get.max(1);
        let mut found = Vec::with_capacity(distinct.len());
        for chunk in distinct.chunks(chunk_size) {
            let mut pending = chunk.to_vec();
            let mut attempt = 0u32;
            loop {
                if attempt > 0 {
                    self.backoff(attempt).await;
                }
                let output = self.store.batch_get_item(&pending).await?;
                found.extend(output.items);
                attempt += 1;

                if output.unprocessed_keys.is_empty() {
                    break;
                }
                if attempt >= self.policy.max_attempts {
                    tracing::warn!(
                        attempts = attempt,
                        remaining = output.unprocessed_keys.len(),
                        "Batch get gave up with unprocessed keys"
                    );
                    return Err(StorageError::RetriesExhausted {
                        attempts: attempt,
                        remaining: output.unprocessed_keys.len(),
                    });
                }
                pending = output.unprocessed_keys;
            }
        }
        Ok(found)
    }

    /// Apply every write request, retrying unprocessed requests.
    pub async fn write_all(&self, requests: Vec<WriteRequest>) -> StorageResult<()> {
        let chunk_size = self.store.limits().max_write.max(1);
        let mut remaining = requests.into_iter().peekable();
        while remaining.peek().is_some() {
            let mut pending: Vec<WriteRequest> = remaining.by_ref().take(chunk_size).collect();
            let mut attempt = 0u32;
            loop {
                if attempt > 0 {
                    self.backoff(attempt).await;
                }
                let output = self.store.batch_write_item(pending).await?;
                attempt += 1;

                if output.unprocessed.is_empty() {
                    break;
                }
                if attempt >= self.policy.max_attempts {
                    tracing::warn!(
                        attempts = attempt,
                        remaining = output.unprocessed.len(),
                        "Batch write gave up with unprocessed requests"
                    );
                    return Err(StorageError::RetriesExhausted {
                        attempts: attempt,
                        remaining: output.unprocessed.len(),
                    });
                }
                pending = output.unprocessed;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{BatchGetOutput, BatchWriteOutput, Item, ItemUpdate};
    use crate::memory::InMemoryKeyValueStore;
    use crate::traits::BatchLimits;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(text: &str) -> Item {
        let mut item = Item::new();
        item.insert("note".to_string(), json!(text));
        item
    }

    /// Store that never makes progress on batch calls.
    struct StalledStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for StalledStore {
        fn limits(&self) -> BatchLimits {
            BatchLimits::default()
        }

        async fn get_item(&self, _key: &str) -> StorageResult<Option<Item>> {
            Ok(None)
        }

        async fn batch_get_item(&self, keys: &[String]) -> StorageResult<BatchGetOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BatchGetOutput {
                items: Vec::new(),
                unprocessed_keys: keys.to_vec(),
            })
        }

        async fn put_item(&self, _key: &str, _item: Item) -> StorageResult<()> {
            Ok(())
        }

        async fn update_item(&self, _key: &str, update: ItemUpdate) -> StorageResult<Item> {
            Ok(update.apply(None))
        }

        async fn delete_item(&self, _key: &str) -> StorageResult<Option<Item>> {
            Ok(None)
        }

        async fn batch_write_item(&self, requests: Vec<WriteRequest>) -> StorageResult<BatchWriteOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BatchWriteOutput {
                unprocessed: requests,
            })
        }

        async fn query(&self, _attribute: &str, _value: &Value) -> StorageResult<Vec<KeyedItem>> {
            Ok(Vec::new())
        }
    }

    proptest! {
        #[test]
        fn prop_full_jitter_within_ceiling(attempt in 0u32..64, seed in any::<u64>()) {
            use rand::SeedableRng;
            let policy = RetryPolicy::default();
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let delay = policy.full_jitter_delay(attempt, &mut rng);
            prop_assert!(delay <= policy.backoff_ceiling(attempt));
            prop_assert!(delay <= policy.max_delay);
        }
    }

    #[test]
    fn test_backoff_ceiling_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ceiling(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(1600));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_millis(3000));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_completes_across_partial_batches() -> StorageResult<()> {
        let store = Arc::new(InMemoryKeyValueStore::new().with_throughput(2));
        for key in ["a", "b", "c", "d", "e"] {
            store.put_item(key, item(key)).await?;
        }
        let client = BatchRetryClient::new(store, RetryPolicy::default());

        let keys: Vec<String> = ["a", "b", "missing", "c", "d", "e", "a"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let mut found: Vec<String> = client
            .get_all(&keys)
            .await?
            .into_iter()
            .map(|k| k.key)
            .collect();
        found.sort();
        assert_eq!(found, vec!["a", "b", "c", "d", "e"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_chunks_to_store_limit() -> StorageResult<()> {
        let store = Arc::new(InMemoryKeyValueStore::new().with_limits(BatchLimits {
            max_get: 3,
            max_write: 3,
        }));
        let keys: Vec<String> = (0..10).map(|i| format!("h{}", i)).collect();
        for key in &keys {
            store.put_item(key, item(key)).await?;
        }
        let client = BatchRetryClient::new(store, RetryPolicy::default());

        assert_eq!(client.get_all(&keys).await?.len(), 10);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_all_completes_across_partial_batches() -> StorageResult<()> {
        let store = Arc::new(InMemoryKeyValueStore::new().with_throughput(1));
        let client = BatchRetryClient::new(store.clone(), RetryPolicy::default());

        let requests = (0..4)
            .map(|i| WriteRequest::Put {
                key: format!("h{}", i),
                item: item("text"),
            })
            .collect();
        client.write_all(requests).await?;
        assert_eq!(store.len().await, 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_gives_up_after_max_attempts() {
        let store = Arc::new(StalledStore {
            calls: AtomicUsize::new(0),
        });
        let client = BatchRetryClient::new(
            store.clone(),
            RetryPolicy::default().with_max_attempts(4),
        );

        let keys = vec!["a".to_string(), "b".to_string()];
        let result = client.get_all(&keys).await;
        assert_eq!(
            result,
            Err(StorageError::RetriesExhausted {
                attempts: 4,
                remaining: 2
            })
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_all_gives_up_after_max_attempts() {
        let store = Arc::new(StalledStore {
            calls: AtomicUsize::new(0),
        });
        let client = BatchRetryClient::new(
            store.clone(),
            RetryPolicy::default().with_max_attempts(3),
        );

        let result = client
            .write_all(vec![WriteRequest::Delete {
                key: "a".to_string(),
            }])
            .await;
        assert!(matches!(
            result,
            Err(StorageError::RetriesExhausted { attempts: 3, remaining: 1 })
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}
