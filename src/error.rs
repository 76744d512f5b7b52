//! Failure taxonomy for the retrieval and generation pipeline.
//!
//! Retrieval-path variants are recovered locally (fewer or no passages).
//! Generation-path variants are surfaced to the transport as an `error` frame,
//! always followed by the terminal `end` frame.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Embedding or index rebuild failed; retrieval proceeds with stale or empty context.
    #[error("retrieval degraded: {0}")]
    RetrievalDegraded(String),

    /// Planner output could not be interpreted; the raw user message is used as the query.
    #[error("query planner output malformed: {0}")]
    PlanningMalformed(String),

    /// The text-generation backend failed after the response had started.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The backend could not be reached or refused the request.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl PipelineError {
    pub fn timeout(what: &str, after: Duration) -> Self {
        Self::UpstreamUnavailable(format!("{what} timed out after {}s", after.as_secs()))
    }
}
