use crate::llm::{Completion, StopReason};
use nanoswarm_core::{parse_arguments, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Events decoded from a streamed LLM response.
///
/// Tool-call fragments carry the provider's positional `index`; the first
/// fragment of a call usually brings `id` and `name`, later ones only
/// pieces of the JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of assistant text.
    TextDelta {
        /// Text fragment.
        text: String,
    },

    /// A fragment of one tool call.
    ToolCallDelta {
        /// Position of the call in the turn.
        index: u32,
        /// Call id, when this fragment carries it.
        id: Option<String>,
        /// Tool name, when this fragment carries it.
        name: Option<String>,
        /// Argument JSON fragment.
        arguments: Option<String>,
    },

    /// Token accounting, usually in the final chunk.
    Usage {
        /// Prompt tokens.
        input_tokens: u64,
        /// Completion tokens.
        output_tokens: u64,
    },

    /// The provider's stop reason.
    Finish {
        /// Raw reason string.
        reason: String,
    },
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds [`StreamEvent`]s into the [`Completion`] a non-streamed call would
/// have returned.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: BTreeMap<u32, PartialCall>,
    usage: TokenUsage,
    finish: Option<String>,
}

impl StreamAccumulator {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event.
    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.text.push_str(&text),
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = self.calls.entry(index).or_default();
                if let Some(id) = id.filter(|s| !s.is_empty()) {
                    call.id = Some(id);
                }
                // Some servers repeat the name in every fragment.
                if let Some(name) = name.filter(|s| !s.is_empty()) {
                    call.name = name;
                }
                if let Some(args) = arguments {
                    call.arguments.push_str(&args);
                }
            }
            StreamEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                self.usage = TokenUsage {
                    input_tokens,
                    output_tokens,
                };
            }
            StreamEvent::Finish { reason } => self.finish = Some(reason),
        }
    }

    /// The reassembled turn.
    pub fn finish(self) -> Completion {
        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .map(|(index, call)| {
                ToolCall::new(
                    call.id.unwrap_or_else(|| format!("call_{index}")),
                    call.name,
                    parse_arguments(&call.arguments),
                )
            })
            .collect();
        let stop_reason = match self.finish.as_deref() {
            Some(reason) => StopReason::from_provider(reason),
            None if !tool_calls.is_empty() => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };
        Completion {
            text: self.text,
            tool_calls,
            stop_reason,
            usage: self.usage,
        }
    }
}

/// Reassembles a complete event sequence.
pub fn reassemble(events: impl IntoIterator<Item = StreamEvent>) -> Completion {
    let mut acc = StreamAccumulator::new();
    for event in events {
        acc.push(event);
    }
    acc.finish()
}

/// Splits a server-sent-events byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// An empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every complete `data:` payload.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Whatever remains once the byte stream closed without a final newline.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}
