#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use lorekeeper::config::LoreConfig;
use lorekeeper::embedding::EmbeddingProvider;
use lorekeeper::error::PipelineError;
use lorekeeper::facts::{Fact, FactStore};
use lorekeeper::llm::{ChatMessage, TextGenerator, TextStream};
use lorekeeper::pipeline::{GenerationEvent, Pipeline};

// ── Fact store ────────────────────────────────────────────────────────────────

/// In-memory fact store whose contents tests can swap at will.
#[derive(Default)]
pub struct MemoryFactStore {
    facts: Mutex<Vec<Fact>>,
    fail: AtomicBool,
}

impl MemoryFactStore {
    pub fn with_texts(texts: &[&str]) -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.set_texts(texts);
        store
    }

    pub fn set_texts(&self, texts: &[&str]) {
        let facts = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Fact {
                id: format!("fact-{i}"),
                category: "lore".into(),
                text: text.to_string(),
            })
            .collect();
        *self.facts.lock().unwrap() = facts;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl FactStore for MemoryFactStore {
    fn list_facts(&self) -> anyhow::Result<Vec<Fact>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("fact store offline");
        }
        Ok(self.facts.lock().unwrap().clone())
    }
}

// ── Embedder ──────────────────────────────────────────────────────────────────

enum EmbedMode {
    /// `[n, 1.0]` where `n` is the text's trailing number (0 if none).
    Numeric,
    /// One dimension per vocabulary word plus a constant bias dimension.
    Keywords(Vec<String>),
}

/// Deterministic embedder with call counting and a failure switch.
pub struct TestEmbedder {
    mode: EmbedMode,
    batch_calls: AtomicUsize,
    texts_embedded: AtomicUsize,
    fail: AtomicBool,
}

impl TestEmbedder {
    fn with_mode(mode: EmbedMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            batch_calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    /// Distance between "x N" and "y M" is `(N - M)^2`.
    pub fn numeric() -> Arc<Self> {
        Self::with_mode(EmbedMode::Numeric)
    }

    pub fn keywords(vocabulary: &[&str]) -> Arc<Self> {
        Self::with_mode(EmbedMode::Keywords(
            vocabulary.iter().map(|w| w.to_lowercase()).collect(),
        ))
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        match &self.mode {
            EmbedMode::Numeric => {
                let n = text
                    .split_whitespace()
                    .last()
                    .and_then(|w| w.parse::<f32>().ok())
                    .unwrap_or(0.0);
                vec![n, 1.0]
            }
            EmbedMode::Keywords(vocab) => {
                let lower = text.to_lowercase();
                let mut v: Vec<f32> = vocab
                    .iter()
                    .map(|word| lower.split_whitespace().filter(|w| *w == word.as_str()).count() as f32)
                    .collect();
                v.push(1.0);
                v
            }
        }
    }
}

impl EmbeddingProvider for TestEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding backend offline");
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        match &self.mode {
            EmbedMode::Numeric => 2,
            EmbedMode::Keywords(vocab) => vocab.len() + 1,
        }
    }
}

// ── Text generator ────────────────────────────────────────────────────────────

pub enum PlanScript {
    Reply(String),
    Fail,
}

pub enum StreamScript {
    /// Yield these fragments; an `Err` ends the stream with `GenerationFailed`.
    Fragments(Vec<Result<String, String>>),
    /// The streaming call itself fails with `UpstreamUnavailable`.
    Unavailable,
}

/// Generator that replays canned responses and records what it was asked.
pub struct ScriptedGenerator {
    plan: PlanScript,
    stream: StreamScript,
    pub complete_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub last_stream_request: Mutex<Option<(String, Vec<ChatMessage>)>>,
}

impl ScriptedGenerator {
    pub fn new(plan_reply: &str, fragments: &[&str]) -> Arc<Self> {
        Self::scripted(
            PlanScript::Reply(plan_reply.to_string()),
            StreamScript::Fragments(fragments.iter().map(|f| Ok(f.to_string())).collect()),
        )
    }

    pub fn scripted(plan: PlanScript, stream: StreamScript) -> Arc<Self> {
        Arc::new(Self {
            plan,
            stream,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            last_stream_request: Mutex::new(None),
        })
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_stream_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default()
    }

    pub fn last_system_prompt(&self) -> String {
        self.last_stream_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|(system, _)| system.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
    ) -> Result<String, PipelineError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        match &self.plan {
            PlanScript::Reply(reply) => Ok(reply.clone()),
            PlanScript::Fail => Err(PipelineError::UpstreamUnavailable("planner offline".into())),
        }
    }

    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<TextStream, PipelineError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_stream_request.lock().unwrap() =
            Some((system_prompt.to_string(), messages.to_vec()));

        match &self.stream {
            StreamScript::Unavailable => {
                Err(PipelineError::UpstreamUnavailable("connection refused".into()))
            }
            StreamScript::Fragments(fragments) => {
                let items: Vec<Result<String, PipelineError>> = fragments
                    .iter()
                    .map(|f| f.clone().map_err(PipelineError::GenerationFailed))
                    .collect();
                Ok(futures::stream::iter(items).boxed())
            }
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

pub fn test_config(top_k: usize, max_passages: usize) -> LoreConfig {
    let mut config = LoreConfig::default();
    config.retrieval.top_k = top_k;
    config.retrieval.max_passages = max_passages;
    config.embedding.timeout_secs = 5;
    config
}

pub fn build_pipeline(
    config: &LoreConfig,
    facts: Arc<dyn FactStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
) -> Pipeline {
    Pipeline::new(config, facts, embedder, generator)
}

/// Texts "fact 0" .. "fact {n-1}".
pub fn numbered_texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("fact {i}")).collect()
}

pub fn as_strs(texts: &[String]) -> Vec<&str> {
    texts.iter().map(String::as_str).collect()
}

/// Collect every event of a generation stream.
pub async fn collect_events(
    stream: impl futures::Stream<Item = GenerationEvent>,
) -> Vec<GenerationEvent> {
    stream.collect().await
}
