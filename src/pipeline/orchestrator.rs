//! Composes planning, retrieval, and streaming generation into one event stream.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::planner::{QueryPlan, QueryPlanner};
use super::retrieval::RetrievalEngine;
use super::{GenerationEvent, GenerationRequest};
use crate::facts::style::StyleConfig;
use crate::llm::{ChatMessage, Role, TextGenerator};

/// Separator between passages in the accumulated context block.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

#[derive(Clone)]
pub struct GenerationOrchestrator {
    planner: QueryPlanner,
    retrieval: RetrievalEngine,
    generator: Arc<dyn TextGenerator>,
    genre: String,
}

impl GenerationOrchestrator {
    pub fn new(
        planner: QueryPlanner,
        retrieval: RetrievalEngine,
        generator: Arc<dyn TextGenerator>,
        genre: impl Into<String>,
    ) -> Self {
        Self {
            planner,
            retrieval,
            generator,
            genre: genre.into(),
        }
    }

    /// Run one generation cycle as a lazy event stream.
    ///
    /// Emits `Queries` (only when retrieval is planned), then one
    /// `ContextPassage` per retrieved passage, then the backend's text deltas,
    /// then `End`. A generation failure is reported as `Failed` just before
    /// `End`. Work only advances while the stream is polled; dropping it stops
    /// any further backend calls.
    pub fn run(&self, request: GenerationRequest) -> impl Stream<Item = GenerationEvent> + Send + 'static {
        let this = self.clone();
        async_stream::stream! {
            let GenerationRequest { mut conversation, prior_context, style } = request;

            let Some(latest) = conversation.pop() else {
                yield GenerationEvent::Failed("conversation is empty".into());
                yield GenerationEvent::End;
                return;
            };
            if latest.role != Role::User {
                tracing::warn!(role = ?latest.role, "last turn is not a user turn");
            }
            let user_message = latest.content;

            let mut full_context = String::new();
            if let QueryPlan::Queries(queries) = this.planner.plan(&user_message, &prior_context).await {
                yield GenerationEvent::Queries(queries.clone());

                let passages = this.retrieval.retrieve_stream(queries);
                futures::pin_mut!(passages);
                while let Some(passage) = passages.next().await {
                    if !full_context.is_empty() {
                        full_context.push_str(PASSAGE_SEPARATOR);
                    }
                    full_context.push_str(&passage);
                    yield GenerationEvent::ContextPassage(passage);
                }
            } else {
                tracing::debug!("planner skipped retrieval");
            }

            if full_context.is_empty() {
                full_context = prior_context;
            }

            let system = generation_system_prompt(&this.genre, &style);
            conversation.push(ChatMessage::user(final_user_turn(&full_context, &user_message)));

            let mut fragments = match this.generator.stream(&system, &conversation).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    tracing::warn!(error = %e, "generation call failed");
                    yield GenerationEvent::Failed(e.to_string());
                    yield GenerationEvent::End;
                    return;
                }
            };

            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => yield GenerationEvent::TextChunk(text),
                    Err(e) => {
                        tracing::warn!(error = %e, "generation stream failed");
                        yield GenerationEvent::Failed(e.to_string());
                        break;
                    }
                }
            }

            yield GenerationEvent::End;
        }
    }
}

pub fn generation_system_prompt(genre: &str, style: &StyleConfig) -> String {
    format!(
        "You are a writing assistant for a {genre} novel. Format your writing using markdown.\n{}",
        style.instructions()
    )
}

/// The synthesized final user turn carrying the context block and the latest message.
pub fn final_user_turn(context: &str, user_message: &str) -> String {
    format!(
        "You may use the context below to stay consistent with story facts.\n\
         Context:\n{context}\n\n\
         User prompt:\n{user_message}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_turn_embeds_context_and_message() {
        let turn = final_user_turn("Mara pilots the Halcyon", "Mara docks at Ceres");
        assert!(turn.contains("Context:\nMara pilots the Halcyon\n"));
        assert!(turn.ends_with("User prompt:\nMara docks at Ceres"));
    }

    #[test]
    fn system_prompt_carries_style() {
        let style = StyleConfig {
            pov: "Third person limited".into(),
            tense: "Present tense".into(),
            style: String::new(),
        };
        let prompt = generation_system_prompt("sci-fi", &style);
        assert!(prompt.starts_with("You are a writing assistant for a sci-fi novel."));
        assert!(prompt.contains("third person limited and present tense"));
    }
}
