//! Per-request note loader.
//!
//! Wraps an async-graphql `DataLoader` so every note lookup made while
//! resolving one operation is collected into a single deduplicated batch
//! fetch, and results are cached for the rest of that request. Misses are
//! cached as `None` so a highlight without a note is looked up once. A
//! loader is built per request and never shared.

use std::collections::HashMap;

use async_graphql::dataloader::{DataLoader, HashMapCache, Loader};

use crate::error::{ApiError, ApiResult};
use crate::repositories::NoteRepository;
use crate::types::NoteRecord;

/// Batch function behind the loader.
pub struct NoteBatchLoader {
    repo: NoteRepository,
}

impl Loader<String> for NoteBatchLoader {
    type Value = Option<NoteRecord>;
    type Error = ApiError;

    async fn load(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Option<NoteRecord>>, ApiError> {
        tracing::debug!(keys = keys.len(), "Loading note batch");
        let mut found = self.repo.fetch(keys).await?;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), found.remove(key)))
            .collect())
    }
}

/// Request-scoped, caching note lookup by highlight id.
pub struct NotesLoader {
    inner: DataLoader<NoteBatchLoader, HashMapCache>,
}

impl NotesLoader {
    pub fn new(repo: NoteRepository) -> Self {
        Self {
            inner: DataLoader::with_cache(
                NoteBatchLoader { repo },
                tokio::spawn,
                HashMapCache::default(),
            ),
        }
    }

    /// The note for one highlight.
    pub async fn load(&self, highlight_id: &str) -> ApiResult<Option<NoteRecord>> {
        let note = self.inner.load_one(highlight_id.to_string()).await?;
        Ok(note.flatten())
    }

    /// Notes for `ids` in the same order and cardinality, `None` where a
    /// highlight has no note. A failed batch fails the whole call.
    pub async fn load_ordered(&self, ids: &[String]) -> ApiResult<Vec<Option<NoteRecord>>> {
        let found: HashMap<String, NoteRecord> = self
            .inner
            .load_many(ids.iter().cloned())
            .await?
            .into_iter()
            .filter_map(|(key, note)| note.map(|note| (key, note)))
            .collect();
        Ok(order_by_keys(ids, &found))
    }

    /// Seed the cache with notes this request just wrote.
    pub async fn prime(&self, notes: Vec<NoteRecord>) {
        self.inner
            .feed_many(
                notes
                    .into_iter()
                    .map(|note| (note.highlight_id.clone(), Some(note))),
            )
            .await;
    }
}

/// Look up each key once in `found`, substituting `None` for misses.
pub fn order_by_keys(keys: &[String], found: &HashMap<String, NoteRecord>) -> Vec<Option<NoteRecord>> {
    keys.iter().map(|key| found.get(key).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn note(id: &str) -> NoteRecord {
        NoteRecord {
            highlight_id: id.to_string(),
            text: format!("note for {}", id),
            created_at: 1,
            updated_at: 1,
        }
    }

    proptest! {
        #[test]
        fn prop_order_by_keys_preserves_length_and_position(
            keys in prop::collection::vec("[a-e]", 0..20),
            stored in prop::collection::hash_set("[a-e]", 0..5),
        ) {
            let found: HashMap<String, NoteRecord> =
                stored.iter().map(|id| (id.clone(), note(id))).collect();
            let ordered = order_by_keys(&keys, &found);

            prop_assert_eq!(ordered.len(), keys.len());
            for (key, entry) in keys.iter().zip(&ordered) {
                match entry {
                    Some(record) => prop_assert_eq!(&record.highlight_id, key),
                    None => prop_assert!(!stored.contains(key)),
                }
            }
        }
    }
}
