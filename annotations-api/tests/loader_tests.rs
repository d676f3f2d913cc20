//! Per-request note loader: batching, deduplication, ordering and caching.

use std::sync::Arc;

use annotations_api::{ApiResult, ErrorCode, Identity, NoteRepository, NotesLoader};

#[path = "support/notes.rs"]
mod test_notes_support;
use test_notes_support::{notes_table, CountingStore, FaultyStore};

fn ids(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_duplicate_keys_fetch_once_and_keep_order() -> ApiResult<()> {
    let store = Arc::new(CountingStore::default());
    let repo = NoteRepository::new(notes_table(store.clone()), &Identity::new(7, true))?;
    repo.create("abc", "note abc").await?;
    repo.create("def", "note def").await?;

    let loader = NotesLoader::new(repo);
    let loaded = loader.load_ordered(&ids(&["hij", "def", "abc", "hij"])).await?;

    let texts: Vec<Option<&str>> = loaded
        .iter()
        .map(|note| note.as_ref().map(|n| n.text.as_str()))
        .collect();
    assert_eq!(texts, vec![None, Some("note def"), Some("note abc"), None]);
    assert_eq!(store.batch_gets(), vec![3]);
    Ok(())
}

#[tokio::test]
async fn test_cached_notes_are_not_fetched_again() -> ApiResult<()> {
    let store = Arc::new(CountingStore::default());
    let repo = NoteRepository::new(notes_table(store.clone()), &Identity::new(7, true))?;
    repo.create("abc", "note abc").await?;

    let loader = NotesLoader::new(repo);
    let first = loader.load("abc").await?;
    let second = loader.load_ordered(&ids(&["abc", "abc"])).await?;

    assert_eq!(second, vec![first.clone(), first]);
    assert_eq!(store.batch_gets().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_notes_are_cached_too() -> ApiResult<()> {
    let store = Arc::new(CountingStore::default());
    let repo = NoteRepository::new(notes_table(store.clone()), &Identity::new(7, true))?;

    let loader = NotesLoader::new(repo);
    assert_eq!(loader.load("no-note").await?, None);
    assert_eq!(loader.load("no-note").await?, None);
    assert_eq!(
        loader.load_ordered(&ids(&["no-note", "no-note"])).await?,
        vec![None, None]
    );
    assert_eq!(store.batch_gets(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_failed_batch_fails_every_pending_id() -> ApiResult<()> {
    let store = Arc::new(FaultyStore::failing_batch_gets());
    let repo = NoteRepository::new(notes_table(store.clone()), &Identity::new(7, true))?;
    repo.create("abc", "note abc").await?;

    let loader = NotesLoader::new(repo);
    let result = loader.load_ordered(&ids(&["abc", "def", "ghi"])).await;
    assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::StorageError));
    Ok(())
}

#[tokio::test]
async fn test_primed_notes_skip_the_store() -> ApiResult<()> {
    let store = Arc::new(CountingStore::default());
    let repo = NoteRepository::new(notes_table(store.clone()), &Identity::new(7, true))?;
    let written = repo.create("new", "fresh note").await?;

    let loader = NotesLoader::new(repo);
    loader.prime(vec![written.clone()]).await;

    assert_eq!(loader.load("new").await?, Some(written));
    assert!(store.batch_gets().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_loaders_do_not_share_results() -> ApiResult<()> {
    let store = Arc::new(CountingStore::default());
    let table = notes_table(store.clone());
    let identity = Identity::new(7, true);

    let first = NotesLoader::new(NoteRepository::new(table.clone(), &identity)?);
    assert_eq!(first.load("abc").await?, None);

    NoteRepository::new(table.clone(), &identity)?
        .create("abc", "written later")
        .await?;

    let second = NotesLoader::new(NoteRepository::new(table, &identity)?);
    let note = second.load("abc").await?;
    assert_eq!(note.map(|n| n.text), Some("written later".to_string()));
    assert_eq!(store.batch_gets().len(), 2);
    Ok(())
}
