use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;

use crate::config::LoreConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::facts::store::SqliteFactStore;
use crate::index::sync::IndexSynchronizer;
use crate::pipeline::RetrievalEngine;

/// Run one retrieval query from the terminal and print the passages it pulls in.
pub async fn search(config: &LoreConfig, query: &str) -> Result<()> {
    let store = Arc::new(SqliteFactStore::new(crate::db::open_database(
        config.resolved_db_path(),
    )?));
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);

    let timeout = config.embedding.timeout();
    let synchronizer = Arc::new(IndexSynchronizer::new(store, Arc::clone(&embedder), timeout));
    let engine = RetrievalEngine::new(
        synchronizer,
        embedder,
        config.retrieval.top_k,
        config.retrieval.max_passages,
        timeout,
    );

    let passages: Vec<String> = engine
        .retrieve_stream(vec![query.to_string()])
        .collect()
        .await;

    if passages.is_empty() {
        println!("No passages found.");
        return Ok(());
    }

    println!("Found {} passage(s)\n", passages.len());
    for (i, passage) in passages.iter().enumerate() {
        println!("  {}. {}", i + 1, passage);
    }
    Ok(())
}
