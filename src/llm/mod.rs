//! Text-generation backend.
//!
//! [`TextGenerator`] has two modes: a single-shot [`TextGenerator::complete`]
//! used by the query planner, and [`TextGenerator::stream`] used for the final
//! generation step. [`openai::OpenAiGenerator`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint.

pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Incremental text fragments from a streaming generation call.
pub type TextStream = BoxStream<'static, Result<String, PipelineError>>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single-shot completion; returns the full response text.
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, PipelineError>;

    /// Streaming completion. The returned stream yields text deltas as they arrive.
    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<TextStream, PipelineError>;
}
