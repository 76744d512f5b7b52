mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{MemoryFactStore, TestEmbedder};
use lorekeeper::error::PipelineError;
use lorekeeper::index::sync::IndexSynchronizer;

fn synchronizer(store: &Arc<MemoryFactStore>, embedder: &Arc<TestEmbedder>) -> IndexSynchronizer {
    IndexSynchronizer::new(store.clone(), embedder.clone(), Duration::from_secs(5))
}

#[tokio::test]
async fn test_first_sync_builds_index() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2", "fact 3"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);

    assert!(sync.current().is_none());
    let snapshot = sync.ensure_current().await.unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.index().len(), snapshot.passages().len());
    assert_eq!(snapshot.passages(), ["fact 1", "fact 2", "fact 3"]);
    assert_eq!(sync.rebuild_count(), 1);
}

#[tokio::test]
async fn test_unchanged_corpus_is_not_re_embedded() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);

    let first = sync.ensure_current().await.unwrap();
    let second = sync.ensure_current().await.unwrap();

    assert_eq!(sync.rebuild_count(), 1);
    assert_eq!(embedder.batch_calls(), 1);
    assert!(Arc::ptr_eq(&first, &second), "same snapshot should be reused");
}

#[tokio::test]
async fn test_edited_fact_triggers_rebuild() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);
    sync.ensure_current().await.unwrap();

    store.set_texts(&["fact 1", "fact 7"]);
    let snapshot = sync.ensure_current().await.unwrap();

    assert_eq!(sync.rebuild_count(), 2);
    assert_eq!(snapshot.passages(), ["fact 1", "fact 7"]);
    assert_eq!(embedder.texts_embedded(), 4, "whole corpus re-embedded");
}

#[tokio::test]
async fn test_reordered_corpus_triggers_rebuild() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);
    sync.ensure_current().await.unwrap();

    store.set_texts(&["fact 2", "fact 1"]);
    let snapshot = sync.ensure_current().await.unwrap();

    assert_eq!(sync.rebuild_count(), 2);
    assert_eq!(snapshot.passage(0), Some("fact 2"));
}

#[tokio::test]
async fn test_blank_facts_are_not_indexed() {
    let store = MemoryFactStore::with_texts(&["fact 1", "   ", "", "fact 2"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);

    let snapshot = sync.ensure_current().await.unwrap();
    assert_eq!(snapshot.passages(), ["fact 1", "fact 2"]);
}

#[tokio::test]
async fn test_empty_corpus_publishes_empty_index() {
    let store = MemoryFactStore::with_texts(&[]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);

    let snapshot = sync.ensure_current().await.unwrap();
    assert!(snapshot.is_empty());
    assert!(snapshot.index().is_empty());
    assert_eq!(embedder.batch_calls(), 0, "nothing to embed");
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_index() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);
    sync.ensure_current().await.unwrap();

    store.set_texts(&["fact 1", "fact 2", "fact 3"]);
    embedder.set_failing(true);

    let err = sync.ensure_current().await.unwrap_err();
    assert!(matches!(err, PipelineError::RetrievalDegraded(_)));

    let current = sync.current().expect("old snapshot still published");
    assert_eq!(current.passages(), ["fact 1", "fact 2"]);
    assert_eq!(current.index().len(), 2);
    assert_eq!(sync.rebuild_count(), 1);

    // Recovers once the backend is back.
    embedder.set_failing(false);
    let snapshot = sync.ensure_current().await.unwrap();
    assert_eq!(snapshot.len(), 3);
}

#[tokio::test]
async fn test_fact_store_failure_is_retrieval_degraded() {
    let store = MemoryFactStore::with_texts(&["fact 1"]);
    let embedder = TestEmbedder::numeric();
    let sync = synchronizer(&store, &embedder);

    store.set_failing(true);
    let err = sync.ensure_current().await.unwrap_err();
    assert!(matches!(err, PipelineError::RetrievalDegraded(_)));
    assert!(sync.current().is_none());
}

#[tokio::test]
async fn test_concurrent_syncs_rebuild_once() {
    let store = MemoryFactStore::with_texts(&["fact 1", "fact 2", "fact 3"]);
    let embedder = TestEmbedder::numeric();
    let sync = Arc::new(synchronizer(&store, &embedder));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.ensure_current().await })
        })
        .collect();

    for task in tasks {
        let snapshot = task.await.unwrap().unwrap();
        assert_eq!(snapshot.len(), snapshot.index().len());
    }
    assert_eq!(sync.rebuild_count(), 1);
    assert_eq!(embedder.batch_calls(), 1);
}
