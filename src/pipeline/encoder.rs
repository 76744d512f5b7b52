//! Serializes generation events into server-sent-event frames.
//!
//! Text deltas are re-buffered: fragments accumulate until the buffer holds a
//! line break or grows past the size threshold, then the whole buffer goes out
//! as one `text` frame. Queries and passages are never buffered. Null
//! characters are stripped from every payload.

use futures::{Stream, StreamExt};

use super::GenerationEvent;

pub const DEFAULT_FLUSH_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Queries,
    Context,
    Text,
    /// Partial-failure marker, always followed by `End`.
    Error,
    End,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queries => "queries",
            Self::Context => "context",
            Self::Text => "text",
            Self::Error => "error",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wire frame: an event name and its JSON payload (empty for `end`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub kind: FrameKind,
    pub data: String,
}

impl WireFrame {
    fn json_string(kind: FrameKind, text: &str) -> Self {
        Self {
            kind,
            data: serde_json::Value::String(strip_nulls(text)).to_string(),
        }
    }

    pub fn queries(queries: &[String]) -> Self {
        let cleaned: Vec<serde_json::Value> = queries
            .iter()
            .map(|q| serde_json::Value::String(strip_nulls(q)))
            .collect();
        Self {
            kind: FrameKind::Queries,
            data: serde_json::Value::Array(cleaned).to_string(),
        }
    }

    pub fn context(passage: &str) -> Self {
        Self::json_string(FrameKind::Context, passage)
    }

    pub fn text(fragment: &str) -> Self {
        Self::json_string(FrameKind::Text, fragment)
    }

    pub fn error(message: &str) -> Self {
        Self::json_string(FrameKind::Error, message)
    }

    pub fn end() -> Self {
        Self {
            kind: FrameKind::End,
            data: String::new(),
        }
    }

    /// `event: <kind>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.data)
    }
}

fn strip_nulls(text: &str) -> String {
    text.replace('\0', "")
}

/// Accumulates text deltas and decides when to flush them.
#[derive(Debug)]
pub struct TextRechunker {
    buffer: String,
    buffered_chars: usize,
    flush_chars: usize,
}

impl TextRechunker {
    pub fn new(flush_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            buffered_chars: 0,
            flush_chars,
        }
    }

    /// Append a fragment; returns the buffer contents if it should be flushed now.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        let fragment = strip_nulls(fragment);
        self.buffered_chars += fragment.chars().count();
        self.buffer.push_str(&fragment);

        if self.buffer.contains('\n') || self.buffered_chars > self.flush_chars {
            self.take()
        } else {
            None
        }
    }

    /// Whatever is still buffered, if non-empty.
    pub fn take(&mut self) -> Option<String> {
        self.buffered_chars = 0;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamEncoder {
    flush_chars: usize,
}

impl Default for StreamEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_CHARS)
    }
}

impl StreamEncoder {
    pub fn new(flush_chars: usize) -> Self {
        Self { flush_chars }
    }

    /// Encode an event stream into wire frames.
    ///
    /// Buffered text is flushed before any non-text frame, so frame order
    /// follows event order. Exactly one `end` frame is emitted, last, even if
    /// the event stream ends without an `End`.
    pub fn encode<S>(self, events: S) -> impl Stream<Item = WireFrame> + Send + 'static
    where
        S: Stream<Item = GenerationEvent> + Send + 'static,
    {
        async_stream::stream! {
            let mut rechunker = TextRechunker::new(self.flush_chars);
            futures::pin_mut!(events);

            while let Some(event) = events.next().await {
                if let GenerationEvent::TextChunk(fragment) = &event {
                    if let Some(chunk) = rechunker.push(fragment) {
                        yield WireFrame::text(&chunk);
                    }
                    continue;
                }

                if let Some(chunk) = rechunker.take() {
                    yield WireFrame::text(&chunk);
                }
                match event {
                    GenerationEvent::Queries(queries) => yield WireFrame::queries(&queries),
                    GenerationEvent::ContextPassage(passage) => yield WireFrame::context(&passage),
                    GenerationEvent::Failed(message) => yield WireFrame::error(&message),
                    GenerationEvent::End => break,
                    GenerationEvent::TextChunk(_) => {}
                }
            }

            if let Some(chunk) = rechunker.take() {
                yield WireFrame::text(&chunk);
            }
            yield WireFrame::end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rechunker_flushes_on_newline_and_remainder() {
        let mut r = TextRechunker::new(50);
        assert_eq!(r.push("Hello"), None);
        assert_eq!(r.push(" wor"), None);
        assert_eq!(r.push("ld\n").as_deref(), Some("Hello world\n"));
        assert_eq!(r.push("done"), None);
        assert_eq!(r.take().as_deref(), Some("done"));
        assert_eq!(r.take(), None);
    }

    #[test]
    fn rechunker_flushes_past_threshold() {
        let mut r = TextRechunker::new(5);
        assert_eq!(r.push("abcde"), None);
        assert_eq!(r.push("f").as_deref(), Some("abcdef"));
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        let mut r = TextRechunker::new(3);
        // 3 characters, 6 bytes
        assert_eq!(r.push("ééé"), None);
    }

    #[test]
    fn nulls_are_stripped() {
        let mut r = TextRechunker::new(50);
        assert_eq!(r.push("a\0b\n").as_deref(), Some("ab\n"));
        assert_eq!(WireFrame::context("x\0y").data, "\"xy\"");
        assert_eq!(WireFrame::queries(&["q\0".into()]).data, "[\"q\"]");
    }

    #[test]
    fn sse_format() {
        assert_eq!(
            WireFrame::text("line\n").to_sse(),
            "event: text\ndata: \"line\\n\"\n\n"
        );
        assert_eq!(WireFrame::end().to_sse(), "event: end\ndata: \n\n");
    }
}
