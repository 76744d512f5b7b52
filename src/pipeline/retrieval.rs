use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::index::sync::{IndexSnapshot, IndexSynchronizer};

/// Runs planned queries against the vector index.
#[derive(Clone)]
pub struct RetrievalEngine {
    synchronizer: Arc<IndexSynchronizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    max_passages: usize,
    embed_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(
        synchronizer: Arc<IndexSynchronizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        max_passages: usize,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            synchronizer,
            embedder,
            top_k,
            max_passages,
            embed_timeout,
        }
    }

    /// Lazily stream passages for `queries`.
    ///
    /// Queries run in order and each contributes its `top_k` hits nearest first.
    /// A passage text is emitted at most once per call, and the stream ends as
    /// soon as `max_passages` have been emitted, even if queries remain.
    ///
    /// The index is synchronized once, when the stream is first polled. If that
    /// fails the previously published index (possibly stale) is used; if there is
    /// none, nothing is emitted.
    pub fn retrieve_stream(&self, queries: Vec<String>) -> impl Stream<Item = String> + Send + 'static {
        let engine = self.clone();
        async_stream::stream! {
            if engine.max_passages == 0 {
                return;
            }
            let Some(snapshot) = engine.snapshot().await else {
                return;
            };
            if snapshot.is_empty() {
                tracing::debug!("corpus is empty, nothing to retrieve");
                return;
            }

            let mut seen: HashSet<String> = HashSet::new();
            for query in queries {
                let hits = match engine.search(&snapshot, &query).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!(query = %query, error = %e, "query skipped");
                        continue;
                    }
                };
                tracing::debug!(query = %query, hits = hits.len(), "query searched");

                for passage in hits {
                    if !seen.insert(passage.clone()) {
                        continue;
                    }
                    yield passage;
                    if seen.len() >= engine.max_passages {
                        return;
                    }
                }
            }
        }
    }

    async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        match self.synchronizer.ensure_current().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                let stale = self.synchronizer.current();
                tracing::warn!(
                    error = %e,
                    stale_passages = stale.as_ref().map_or(0, |s| s.len()),
                    "index sync failed, retrieving from previous index"
                );
                stale
            }
        }
    }

    /// Embed one query and return its hit passages, nearest first.
    async fn search(&self, snapshot: &IndexSnapshot, query: &str) -> Result<Vec<String>, PipelineError> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::time::timeout(
            self.embed_timeout,
            tokio::task::spawn_blocking(move || embedder.embed(&text)),
        )
        .await
        .map_err(|_| {
            PipelineError::RetrievalDegraded(format!(
                "query embedding timed out after {}s",
                self.embed_timeout.as_secs()
            ))
        })?
        .map_err(|e| PipelineError::RetrievalDegraded(format!("embedding task failed: {e}")))?
        .map_err(|e| PipelineError::RetrievalDegraded(format!("query embedding failed: {e:#}")))?;

        let positions = snapshot
            .index()
            .search(&vector, self.top_k)
            .map_err(|e| PipelineError::RetrievalDegraded(format!("index search failed: {e:#}")))?;

        Ok(positions
            .into_iter()
            .filter_map(|pos| snapshot.passage(pos).map(str::to_string))
            .collect())
    }
}
