//! Keeps the vector index consistent with the fact corpus.
//!
//! The published state is a single immutable [`IndexSnapshot`] behind an `Arc`.
//! A rebuild constructs a complete new snapshot off to the side and swaps the
//! pointer in one step, so readers holding the previous `Arc` keep a consistent
//! `(passages, index)` pair and nobody ever observes one without the other.
//! Rebuilds are serialized by an async mutex; a request arriving mid-rebuild
//! waits for it and then sees the new snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;

use super::VectorIndex;
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::facts::{corpus_snapshot, FactStore};

/// An immutable corpus snapshot together with the index built from it.
#[derive(Debug)]
pub struct IndexSnapshot {
    passages: Vec<String>,
    index: VectorIndex,
}

impl IndexSnapshot {
    pub fn passages(&self) -> &[String] {
        &self.passages
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Passage at an index position returned by [`VectorIndex::search`].
    pub fn passage(&self, position: usize) -> Option<&str> {
        self.passages.get(position).map(String::as_str)
    }
}

pub struct IndexSynchronizer {
    facts: Arc<dyn FactStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    published: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuild_lock: Mutex<()>,
    rebuilds: AtomicU64,
    embed_timeout: Duration,
}

impl IndexSynchronizer {
    pub fn new(
        facts: Arc<dyn FactStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            facts,
            embedder,
            published: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
            embed_timeout,
        }
    }

    /// The currently published snapshot, if any rebuild has succeeded yet.
    pub fn current(&self) -> Option<Arc<IndexSnapshot>> {
        match self.published.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of successful rebuilds since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Make sure the published index reflects the current fact corpus.
    ///
    /// Loads a fresh snapshot from the fact store and compares it, text by text
    /// and in order, against the one the published index was built from. On a
    /// difference (or when nothing is published yet) every passage is re-embedded
    /// and a new index is published. On failure the previous snapshot stays in
    /// place and [`PipelineError::RetrievalDegraded`] is returned.
    pub async fn ensure_current(&self) -> Result<Arc<IndexSnapshot>, PipelineError> {
        let _rebuild = self.rebuild_lock.lock().await;

        let facts = Arc::clone(&self.facts);
        let listed = tokio::task::spawn_blocking(move || facts.list_facts())
            .await
            .map_err(|e| PipelineError::RetrievalDegraded(format!("fact store task failed: {e}")))?
            .map_err(|e| PipelineError::RetrievalDegraded(format!("failed to list facts: {e:#}")))?;
        let passages = corpus_snapshot(&listed);

        if let Some(current) = self.current() {
            if current.passages == passages {
                return Ok(current);
            }
        }

        let snapshot = Arc::new(self.rebuild(passages).await?);
        match self.published.write() {
            Ok(mut guard) => *guard = Some(Arc::clone(&snapshot)),
            Err(poisoned) => *poisoned.into_inner() = Some(Arc::clone(&snapshot)),
        }
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        tracing::info!(passages = snapshot.len(), "vector index rebuilt");
        Ok(snapshot)
    }

    async fn rebuild(&self, passages: Vec<String>) -> Result<IndexSnapshot, PipelineError> {
        let dim = self.embedder.dimensions();
        if passages.is_empty() {
            return Ok(IndexSnapshot {
                passages,
                index: VectorIndex::empty(dim),
            });
        }

        tracing::debug!(passages = passages.len(), "re-embedding corpus");
        let embedder = Arc::clone(&self.embedder);
        let texts = passages.clone();
        let task = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        });

        let embeddings = tokio::time::timeout(self.embed_timeout, task)
            .await
            .map_err(|_| {
                PipelineError::RetrievalDegraded(format!(
                    "corpus embedding timed out after {}s",
                    self.embed_timeout.as_secs()
                ))
            })?
            .map_err(|e| PipelineError::RetrievalDegraded(format!("embedding task failed: {e}")))?
            .map_err(|e| PipelineError::RetrievalDegraded(format!("corpus embedding failed: {e:#}")))?;

        if embeddings.len() != passages.len() {
            return Err(PipelineError::RetrievalDegraded(format!(
                "embedding provider returned {} vectors for {} passages",
                embeddings.len(),
                passages.len()
            )));
        }

        let index = VectorIndex::build(&embeddings, dim)
            .map_err(|e| PipelineError::RetrievalDegraded(format!("index build failed: {e:#}")))?;

        Ok(IndexSnapshot { passages, index })
    }
}
