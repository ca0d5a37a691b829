//! Incremental completion output.

use super::errors::ModelError;
use super::types::{FinishReason, ModelResponse, ToolCall};
use futures::stream::BoxStream;

/// A stream of completion chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ModelError>>;

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A fragment of assistant text.
    Text(String),
    /// A fragment of a tool call. Fragments with the same index belong to
    /// the same call; `id` and `name` usually arrive only on the first one.
    ToolCall {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// The model finished.
    Finish(FinishReason),
}

impl StreamChunk {
    /// Split a complete response into the chunks a stream would have produced.
    pub fn from_response(response: ModelResponse) -> Vec<StreamChunk> {
        let mut chunks = Vec::with_capacity(response.tool_calls.len() + 2);
        if !response.text.is_empty() {
            chunks.push(StreamChunk::Text(response.text));
        }
        for (index, call) in response.tool_calls.into_iter().enumerate() {
            chunks.push(StreamChunk::ToolCall {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments: call.arguments,
            });
        }
        chunks.push(StreamChunk::Finish(response.finish_reason));
        chunks
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    index: usize,
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks back into a [`ModelResponse`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<PartialCall>,
    finish_reason: Option<FinishReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Text(text) => self.text.push_str(&text),
            StreamChunk::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let position = match self.calls.iter().position(|c| c.index == index) {
                    Some(position) => position,
                    None => {
                        self.calls.push(PartialCall {
                            index,
                            ..PartialCall::default()
                        });
                        self.calls.len() - 1
                    }
                };
                let call = &mut self.calls[position];
                if let Some(id) = id {
                    call.id = id;
                }
                if let Some(name) = name {
                    call.name.push_str(&name);
                }
                call.arguments.push_str(&arguments);
            }
            StreamChunk::Finish(reason) => self.finish_reason = Some(reason),
        }
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(mut self) -> ModelResponse {
        self.calls.sort_by_key(|c| c.index);
        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.name,
                arguments: c.arguments,
            })
            .collect();
        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        ModelResponse {
            text: self.text,
            tool_calls,
            finish_reason,
            ..ModelResponse::default()
        }
    }
}
