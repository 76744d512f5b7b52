//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::{ChatMessage, TextGenerator, TextStream};
use crate::config::LlmConfig;
use crate::error::PipelineError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "no API key configured; requests are sent without authorization"
            );
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            request_timeout: config.request_timeout(),
            idle_timeout: config.stream_idle_timeout(),
        })
    }

    fn request(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage::system(system_prompt));
        all.extend_from_slice(messages);

        let body = json!({
            "model": self.model,
            "messages": all,
            "stream": stream,
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request and check the status, bounded by the request timeout.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, PipelineError> {
        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| PipelineError::timeout("chat completion request", self.request_timeout))?
            .map_err(|e| PipelineError::UpstreamUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UpstreamUnavailable(format!(
                "backend returned HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, PipelineError> {
        let response = self.send(self.request(system_prompt, messages, false)).await?;

        let parsed: CompletionResponse = tokio::time::timeout(self.request_timeout, response.json())
            .await
            .map_err(|_| PipelineError::timeout("chat completion body", self.request_timeout))?
            .map_err(|e| PipelineError::GenerationFailed(format!("invalid completion body: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<TextStream, PipelineError> {
        let response = self.send(self.request(system_prompt, messages, true)).await?;
        let mut bytes = Box::pin(response.bytes_stream());
        let idle = self.idle_timeout;

        let fragments = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            loop {
                let next = match tokio::time::timeout(idle, bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(PipelineError::GenerationFailed(format!(
                            "stream stalled for {}s",
                            idle.as_secs()
                        )));
                        return;
                    }
                };

                let (lines, finished) = match next {
                    Some(Ok(chunk)) => (decoder.push(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(PipelineError::GenerationFailed(format!("stream read failed: {e}")));
                        return;
                    }
                    None => (decoder.finish(), true),
                };

                for line in lines {
                    match line {
                        SseLine::Done => return,
                        SseLine::Data(data) => match parse_delta(&data) {
                            Ok(Some(text)) => yield Ok(text),
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        },
                    }
                }

                if finished {
                    break;
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the text delta from one streamed chunk. `Ok(None)` for chunks without text.
fn parse_delta(data: &str) -> Result<Option<String>, PipelineError> {
    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        PipelineError::GenerationFailed(format!("invalid stream chunk: {e}"))
    })?;
    if let Some(error) = chunk.error {
        return Err(PipelineError::GenerationFailed(format!("backend error: {error}")));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Data(String),
    Done,
}

/// Incremental decoder for `data:` lines of a server-sent event body.
///
/// Bytes are buffered until a full line is available, so lines (and multi-byte
/// characters) split across network reads are reassembled.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.extend(decode_line(&raw));
        }
        lines
    }

    /// Decode whatever is left once the body ends without a trailing newline.
    fn finish(&mut self) -> Vec<SseLine> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseLine> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseLine::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseLine::Data(data.to_string()))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
