//! The multi-phase generation pipeline.
//!
//! ```text
//! conversation ─▶ QueryPlanner ─▶ RetrievalEngine ─▶ TextGenerator::stream
//!                      │                │                     │
//!                  Queries(..)   ContextPassage(..)     TextChunk(..)  ─▶ End
//!                      └────────────────┴─────────────────────┘
//!                            GenerationOrchestrator::run
//!                                       │
//!                               StreamEncoder::encode ─▶ wire frames
//! ```
//!
//! Everything is a lazy, pull-driven stream: no backend call is issued until
//! the consumer polls for the next event, and dropping the stream cancels the
//! remaining work.

pub mod encoder;
pub mod orchestrator;
pub mod planner;
pub mod retrieval;

use std::sync::Arc;

use crate::config::LoreConfig;
use crate::embedding::EmbeddingProvider;
use crate::facts::style::StyleConfig;
use crate::facts::FactStore;
use crate::index::sync::IndexSynchronizer;
use crate::llm::{ChatMessage, TextGenerator};

pub use encoder::{FrameKind, StreamEncoder, WireFrame};
pub use orchestrator::GenerationOrchestrator;
pub use planner::{QueryPlan, QueryPlanner};
pub use retrieval::RetrievalEngine;

/// One typed unit of the generation output, in emission order.
///
/// A cycle is `Queries? ContextPassage* TextChunk* Failed? End`, with exactly
/// one `End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// The retrieval queries chosen for this cycle. Never empty.
    Queries(Vec<String>),
    /// One retrieved passage, in discovery order.
    ContextPassage(String),
    /// One raw text delta from the generation backend.
    TextChunk(String),
    /// Generation stopped early; the message describes why.
    Failed(String),
    End,
}

/// Input to one generation cycle.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Full conversation; the last turn is the latest user message.
    pub conversation: Vec<ChatMessage>,
    /// Context supplied by the previous turn, if any.
    pub prior_context: String,
    pub style: StyleConfig,
}

/// The wired-up pipeline components sharing one index synchronizer.
#[derive(Clone)]
pub struct Pipeline {
    pub synchronizer: Arc<IndexSynchronizer>,
    pub retrieval: RetrievalEngine,
    pub orchestrator: GenerationOrchestrator,
    pub encoder: StreamEncoder,
}

impl Pipeline {
    pub fn new(
        config: &LoreConfig,
        facts: Arc<dyn FactStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let embed_timeout = config.embedding.timeout();
        let synchronizer = Arc::new(IndexSynchronizer::new(
            facts,
            Arc::clone(&embedder),
            embed_timeout,
        ));
        let retrieval = RetrievalEngine::new(
            Arc::clone(&synchronizer),
            embedder,
            config.retrieval.top_k,
            config.retrieval.max_passages,
            embed_timeout,
        );
        let planner = QueryPlanner::new(
            Arc::clone(&generator),
            config.retrieval.max_queries,
            config.generation.genre.clone(),
        );
        let orchestrator = GenerationOrchestrator::new(
            planner,
            retrieval.clone(),
            generator,
            config.generation.genre.clone(),
        );

        Self {
            synchronizer,
            retrieval,
            orchestrator,
            encoder: StreamEncoder::new(config.generation.rechunk_chars),
        }
    }
}
