//! OpenAI-compatible chat completions backend.
//!
//! Local inference servers (llama.cpp, LM Studio, Ollama, Foundry Local)
//! expose this wire format under `/v1/chat/completions`.

use crate::model::{
    Backend, ChunkStream, FinishReason, Message, ModelError, ModelRequest, ModelResponse,
    StreamChunk, ToolCall, Usage,
};
use crate::tools::ToolSpec;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    /// Usually a JSON string; some servers send the object itself.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiDeltaToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiDeltaToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct ApiDeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    model: String,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiBackendBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
        }
    }

    /// Base URL of the server, with or without a trailing `/v1`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn build(self) -> OpenAiBackend {
        let base = self.endpoint.trim_end_matches('/');
        let url = if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        };
        OpenAiBackend {
            client: reqwest::Client::new(),
            url,
            model: self.model,
            api_key: self.api_key,
        }
    }
}

/// Backend for servers speaking the OpenAI chat completions API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn builder(model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(model)
    }

    /// Full URL of the completions endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let (role, tool_call_id) = match msg {
            Message::System { .. } => ("system", None),
            Message::User { .. } => ("user", None),
            Message::Assistant { .. } => ("assistant", None),
            Message::ToolResult { call_id, .. } => ("tool", Some(call_id.clone())),
        };
        ApiMessage {
            role,
            content: msg.text().to_string(),
            tool_calls: msg
                .tool_calls()
                .iter()
                .map(|call| ApiToolCall {
                    id: call.id.clone(),
                    kind: "function",
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id,
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            kind: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.json_schema(),
            },
        }
    }

    fn build_request<'a>(&'a self, request: &ModelRequest<'_>, stream: bool) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            max_tokens: request.options.max_output_tokens,
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream,
        }
    }

    async fn send(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }
        Ok(response)
    }

    fn response_from_api(api: ApiResponse) -> Result<ModelResponse, ModelError> {
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.function.name,
                arguments: match call.function.arguments {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                },
            })
            .collect();

        let finish_reason = map_finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty());
        let usage = api.usage.unwrap_or_default();

        Ok(ModelResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({}, {})", self.model, self.url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = self.build_request(&request, false);
        tracing::debug!(model = %self.model, messages = body.messages.len(), tools = body.tools.len(), "chat completion");

        let api_response: ApiResponse = self
            .send(&body)
            .await?
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Self::response_from_api(api_response)
    }

    async fn stream(&self, request: ModelRequest<'_>) -> Result<ChunkStream, ModelError> {
        let body = self.build_request(&request, true);
        tracing::debug!(model = %self.model, messages = body.messages.len(), "streaming chat completion");

        let bytes = self
            .send(&body)
            .await?
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| ModelError::Network(e.to_string()))
            })
            .boxed();
        Ok(sse_stream(bytes))
    }
}

/// Map a wire finish reason. A missing reason is inferred from whether the
/// response carried tool calls.
pub fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("tool_calls" | "function_call") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(other) => FinishReason::Unknown(other.to_string()),
        None if has_tool_calls => FinishReason::ToolCalls,
        None => FinishReason::Stop,
    }
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, ModelError>>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamChunk>,
    done: bool,
}

impl SseState {
    /// Parse every complete line in the buffer.
    fn drain_lines(&mut self) -> Result<(), ModelError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                self.buffer.clear();
                return Ok(());
            }
            if data.is_empty() {
                continue;
            }
            let chunk: ApiStreamChunk = serde_json::from_str(data).map_err(|e| {
                ModelError::InvalidResponse(format!("stream chunk `{data}`: {e}"))
            })?;
            self.pending.extend(chunks_from_api(chunk));
        }
        Ok(())
    }
}

fn chunks_from_api(chunk: ApiStreamChunk) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            out.push(StreamChunk::Text(text));
        }
        for call in choice.delta.tool_calls {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            out.push(StreamChunk::ToolCall {
                index: call.index,
                id: call.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk::Finish(map_finish_reason(Some(reason.as_str()), false)));
        }
    }
    out
}

/// Turn a server-sent-events body into completion chunks. Ends at
/// `data: [DONE]` or when the body ends.
fn sse_stream(body: BoxStream<'static, Result<Vec<u8>, ModelError>>) -> ChunkStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.done {
                return None;
            }
            let next = state.body.next().await;
            let drained = match next {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines()
                }
                Some(Err(e)) => Err(e),
                None => {
                    state.buffer.push(b'\n');
                    let drained = state.drain_lines();
                    state.done = true;
                    drained
                }
            };
            if let Err(e) = drained {
                state.done = true;
                state.pending.clear();
                return Some((Err(e), state));
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelOptions, StreamAccumulator};
    use crate::tools::ParamType;

    fn backend() -> OpenAiBackend {
        OpenAiBackend::builder("phi-4-mini").build()
    }

    #[test]
    fn endpoint_normalization() {
        let a = OpenAiBackend::builder("m").endpoint("http://localhost:1234/").build();
        let b = OpenAiBackend::builder("m").endpoint("http://localhost:1234/v1").build();
        assert_eq!(a.url(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(b.url(), a.url());
    }

    #[test]
    fn request_carries_tools_and_options() {
        let messages = vec![
            Message::system("Be brief."),
            Message::user("Send it"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "SendSms".into(),
                    arguments: r#"{"message":"hi"}"#.into(),
                }],
            ),
            Message::tool_result("call_1", "SMS sent"),
        ];
        let tools = vec![
            ToolSpec::new("SendSms", "Send an SMS").param(
                "message",
                ParamType::String,
                true,
                "Text",
            ),
        ];
        let request = ModelRequest {
            messages: &messages,
            tools: &tools,
            options: ModelOptions::default(),
        };
        let backend = backend();
        let json = serde_json::to_value(backend.build_request(&request, false)).unwrap();

        assert_eq!(json["model"], "phi-4-mini");
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["stream"], false);
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "SendSms");
        assert_eq!(json["tools"][0]["function"]["parameters"]["required"][0], "message");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][2]["tool_calls"][0]["function"]["name"], "SendSms");
        assert_eq!(json["messages"][3]["role"], "tool");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
    }

    #[test]
    fn request_omits_empty_tools() {
        let messages = vec![Message::user("hi")];
        let request = ModelRequest {
            messages: &messages,
            tools: &[],
            options: ModelOptions::default(),
        };
        let backend = backend();
        let json = serde_json::to_value(backend.build_request(&request, true)).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn parses_tool_call_response() {
        let api: ApiResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "GetCurrentWeather", "arguments": "{\"location\":\"Boston\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 7}
            }"#,
        )
        .unwrap();
        let response = OpenAiBackend::response_from_api(api).unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls[0].id, "call_abc");
        assert_eq!(response.tool_calls[0].arguments, r#"{"location":"Boston"}"#);
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[test]
    fn object_arguments_and_missing_ids_are_tolerated() {
        let api: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"tool_calls":[{"function":{"name":"A","arguments":{"x":1}}}]}}]}"#,
        )
        .unwrap();
        let response = OpenAiBackend::response_from_api(api).unwrap();
        assert_eq!(response.tool_calls[0].id, "call_0");
        assert_eq!(response.tool_calls[0].arguments, r#"{"x":1}"#);
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn empty_choices_is_invalid() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            OpenAiBackend::response_from_api(api),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop"), true), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("function_call"), false), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason(Some("length"), false), FinishReason::Length);
        assert_eq!(
            map_finish_reason(Some("content_filter"), false),
            FinishReason::ContentFilter
        );
        assert_eq!(
            map_finish_reason(Some("eos"), false),
            FinishReason::Unknown("eos".into())
        );
        assert_eq!(map_finish_reason(None, false), FinishReason::Stop);
    }

    fn body(parts: &[&str]) -> BoxStream<'static, Result<Vec<u8>, ModelError>> {
        let parts: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts).boxed()
    }

    #[tokio::test]
    async fn sse_stream_reassembles_split_events() {
        let stream = sse_stream(body(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"SendSms\",\"arguments\":\"{\\\"message\\\":\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"hi\\\"}\"}}]}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\ndata: [DONE]\n\n",
        ]));
        let chunks: Vec<_> = stream.collect().await;
        let mut acc = StreamAccumulator::new();
        for chunk in chunks {
            acc.push(chunk.unwrap());
        }
        let response = acc.finish();
        assert_eq!(response.text, "Hello");
        assert_eq!(response.tool_calls[0].name, "SendSms");
        assert_eq!(response.tool_calls[0].arguments, r#"{"message":"hi"}"#);
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[tokio::test]
    async fn sse_stream_reports_bad_chunk() {
        let stream = sse_stream(body(&["data: {not json}\n\n"]));
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(ModelError::InvalidResponse(_))));
    }
}
