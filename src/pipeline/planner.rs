//! Turns a user message into a small set of retrieval queries.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::llm::{ChatMessage, TextGenerator};

/// Token the model returns when the prior context already covers the message.
pub const NO_CONTEXT_SENTINEL: &str = "NO_CONTEXT_NEEDED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Prior context is sufficient; skip retrieval for this cycle.
    NoRetrievalNeeded,
    /// Queries to run, in order. Never empty.
    Queries(Vec<String>),
}

impl QueryPlan {
    pub fn queries(&self) -> &[String] {
        match self {
            Self::NoRetrievalNeeded => &[],
            Self::Queries(queries) => queries,
        }
    }
}

#[derive(Clone)]
pub struct QueryPlanner {
    generator: Arc<dyn TextGenerator>,
    max_queries: usize,
    genre: String,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>, max_queries: usize, genre: impl Into<String>) -> Self {
        Self {
            generator,
            max_queries: max_queries.max(1),
            genre: genre.into(),
        }
    }

    /// Plan retrieval for `user_message`, given what `prior_context` already covers.
    ///
    /// Never fails: a backend error or an unusable response degrades to a single
    /// query equal to the raw user message.
    pub async fn plan(&self, user_message: &str, prior_context: &str) -> QueryPlan {
        let system = self.system_prompt();
        let prompt = self.user_prompt(user_message, prior_context);

        let response = match self
            .generator
            .complete(&system, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "query planning call failed, using raw message");
                return fallback(user_message);
            }
        };

        match parse_plan(&response, self.max_queries) {
            Ok(plan) => {
                tracing::debug!(queries = ?plan.queries(), "query plan ready");
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "using raw message as the only query");
                fallback(user_message)
            }
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You have access to a data set containing facts about a {genre} novel, including \
             facts about the characters, the setting, and the plot. You write search queries \
             that help find useful context and details from the database to fill in information \
             missing from the user's writing prompt. The search queries can, for example, ask who \
             a character is, what the characters' relationship is like, or what a place or an \
             item is like.",
            genre = self.genre
        )
    }

    fn user_prompt(&self, user_message: &str, prior_context: &str) -> String {
        let prior = if prior_context.trim().is_empty() {
            "(none)"
        } else {
            prior_context
        };
        format!(
            "The user is writing a {genre} novel. Based on their writing prompt, write up to \
             {max} short factual search queries, one per line, that would help find background \
             information about the characters, places, items, or events it mentions that is not \
             already covered by the context below. Keep them concise and simple.\n\
             If the context below already covers everything the prompt needs, reply with exactly \
             {sentinel} and nothing else.\n\n\
             Context already retrieved:\n{prior}\n\n\
             Writing prompt: \"{user_message}\"",
            genre = self.genre,
            max = self.max_queries,
            sentinel = NO_CONTEXT_SENTINEL,
        )
    }
}

fn fallback(user_message: &str) -> QueryPlan {
    QueryPlan::Queries(vec![user_message.to_string()])
}

/// Parse the planner's free-form response.
///
/// The sentinel anywhere in the response means no retrieval. Otherwise each
/// non-blank line, with list markers and wrapping quotes removed, is a query,
/// up to `max_queries`. A response with no usable lines is
/// [`PipelineError::PlanningMalformed`].
pub fn parse_plan(response: &str, max_queries: usize) -> Result<QueryPlan, PipelineError> {
    if response.contains(NO_CONTEXT_SENTINEL) {
        return Ok(QueryPlan::NoRetrievalNeeded);
    }

    let queries: Vec<String> = response
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .take(max_queries)
        .map(str::to_string)
        .collect();

    if queries.is_empty() {
        return Err(PipelineError::PlanningMalformed(format!(
            "no queries in planner response {:?}",
            response.trim()
        )));
    }
    Ok(QueryPlan::Queries(queries))
}

fn clean_line(line: &str) -> &str {
    let mut line = line.trim();
    line = line.trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | '+'));

    // "1." / "2)" numbering
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(['.', ')']) {
            line = stripped;
        }
    }

    let line = line.trim();
    line.strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(line)
        .trim()
}
