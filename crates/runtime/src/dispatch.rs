//! The dispatch loop: ask the model, run the requested tool, ask again.

use crate::interpret::{ChatOutcome, Outcome, ToolCallRequest, ToolCallResult, interpret};
use crate::model::{
    Backend, ChunkStream, FinishReason, Message, ModelError, ModelOptions, ModelRequest,
    ModelResponse,
};
use crate::tools::{ToolContext, ToolError, ToolRegistry, ToolSpec};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Header that opens the textual tool catalogue in the system prompt.
pub const CATALOGUE_HEADER: &str = "You have access to the following tools";

/// Final text when the model produced nothing usable.
pub const NO_RESPONSE: &str = "No response from model.";

/// How tools are offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProtocol {
    /// Structured function-calling declarations.
    #[default]
    Native,
    /// A catalogue in the system prompt; calls arrive as JSON in the text.
    Textual,
}

impl std::fmt::Display for ToolProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Textual => write!(f, "textual"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub protocol: ToolProtocol,
    pub options: ModelOptions,
    /// Upper bound on a single tool execution.
    pub tool_timeout: Duration,
    /// Upper bound on model calls in multi-round mode.
    pub max_rounds: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            protocol: ToolProtocol::Native,
            options: ModelOptions::default(),
            tool_timeout: Duration::from_secs(60),
            max_rounds: 16,
        }
    }
}

impl DispatchConfig {
    /// Reject limits that would stop every turn before it starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::Config("max_rounds must be at least 1".into()));
        }
        if self.tool_timeout.is_zero() {
            return Err(Error::Config("tool_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Result of a single-turn dispatch.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Final text for the user.
    pub text: String,
    /// Interpretation of the first model response, with the tool result if
    /// a tool ran.
    pub outcome: ChatOutcome,
    /// Protocol that produced the answer, after any fallback.
    pub protocol: ToolProtocol,
    /// Model failure that ended the turn early.
    pub error: Option<ModelError>,
}

impl TurnReport {
    fn failed(protocol: ToolProtocol, outcome: ChatOutcome, error: ModelError) -> Self {
        Self {
            text: format!("Error during chat completion: {error}"),
            outcome,
            protocol,
            error: Some(error),
        }
    }
}

/// Drives model calls and tool executions for one conversation.
pub struct Dispatcher<B> {
    backend: B,
    registry: Arc<ToolRegistry>,
    config: DispatchConfig,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(backend: B, registry: Arc<ToolRegistry>, config: DispatchConfig) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one user turn: at most one tool call and one follow-up model call.
    ///
    /// Model failures do not fail the turn. A failed native call is retried
    /// once with the textual protocol; any other failure becomes the
    /// returned text. Only cancellation is an error.
    pub async fn run_turn(
        &self,
        history: &[Message],
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReport> {
        let mut protocol = self.config.protocol;
        let (mut messages, response) = loop {
            let messages = self.turn_messages(protocol, system, history, user);
            match self.complete(&messages, protocol, cancel).await {
                Ok(response) => break (messages, response),
                Err(Error::Model(e)) if protocol == ToolProtocol::Native => {
                    tracing::warn!(error = %e, "[Warning] Native tool calling failed, retrying with textual protocol");
                    protocol = ToolProtocol::Textual;
                }
                Err(Error::Model(e)) => {
                    tracing::error!(error = %e, "chat completion failed");
                    return Ok(TurnReport::failed(protocol, plain(), e));
                }
                Err(e) => return Err(e),
            }
        };

        let mut outcome = interpret(&response);
        let request = match &outcome.outcome {
            Outcome::ToolCallPending(request) => request.clone(),
            _ => {
                let text = outcome
                    .content
                    .clone()
                    .unwrap_or_else(|| NO_RESPONSE.to_string());
                return Ok(TurnReport {
                    text,
                    outcome,
                    protocol,
                    error: None,
                });
            }
        };

        let result = self.execute(&request, cancel).await?;
        append_result(&mut messages, &response, &request, &result.output);
        outcome.complete(result);

        tracing::debug!(%protocol, "requesting follow-up");
        match self.complete(&messages, protocol, cancel).await {
            Ok(follow_up) => {
                let (_, visible) = crate::interpret::split_reasoning(&follow_up.text);
                let text = if visible.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    visible
                };
                Ok(TurnReport {
                    text,
                    outcome,
                    protocol,
                    error: None,
                })
            }
            Err(Error::Model(e)) => {
                tracing::error!(error = %e, "follow-up completion failed");
                Ok(TurnReport::failed(protocol, outcome, e))
            }
            Err(e) => Err(e),
        }
    }

    /// Keep handing tool results back until the model stops asking for
    /// tools. Returns the full conversation, final answer last.
    ///
    /// Every requested call is executed in the order given. A length or
    /// content-filter finish is fatal.
    pub async fn run_until_done(
        &self,
        mut messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        self.config.validate()?;
        let protocol = self.config.protocol;
        if protocol == ToolProtocol::Textual {
            attach_catalogue(&mut messages, self.registry.specs());
        }

        for round in 1..=self.config.max_rounds {
            let response = self.complete(&messages, protocol, cancel).await?;
            tracing::debug!(round, finish_reason = %response.finish_reason, calls = response.tool_calls.len(), "model round");

            if matches!(
                response.finish_reason,
                FinishReason::Length | FinishReason::ContentFilter
            ) {
                tracing::error!(round, finish_reason = %response.finish_reason, "fatal finish");
                return Err(Error::FatalFinish(response.finish_reason));
            }

            if !response.tool_calls.is_empty() {
                messages.push(Message::assistant_with_calls(
                    response.text.clone(),
                    response.tool_calls.clone(),
                ));
                for call in &response.tool_calls {
                    let result = self.execute(&ToolCallRequest::native(call), cancel).await?;
                    messages.push(Message::tool_result(call.id.clone(), result.output));
                }
                continue;
            }

            if protocol == ToolProtocol::Textual {
                if let Outcome::ToolCallPending(request) = interpret(&response).outcome {
                    let result = self.execute(&request, cancel).await?;
                    append_result(&mut messages, &response, &request, &result.output);
                    continue;
                }
            }

            if response.finish_reason != FinishReason::Stop {
                tracing::warn!(finish_reason = %response.finish_reason, "treating unexpected finish reason as stop");
            }
            messages.push(Message::assistant(response.text));
            return Ok(messages);
        }

        Err(Error::RoundLimit(self.config.max_rounds))
    }

    /// Stream one completion. Under the textual protocol the catalogue is
    /// attached to the system prompt and tool calls arrive in the text.
    pub async fn stream(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        let protocol = self.config.protocol;
        let mut messages = messages.to_vec();
        if protocol == ToolProtocol::Textual {
            attach_catalogue(&mut messages, self.registry.specs());
        }
        let request = self.request(&messages, protocol);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            stream = self.backend.stream(request) => Ok(stream?),
        }
    }

    /// Run one tool call.
    ///
    /// Unknown tools, bad arguments, handler failures and timeouts become
    /// the result text. Only cancellation of the turn is an error.
    pub async fn execute(
        &self,
        request: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult> {
        let name = &request.function_name;
        let arguments = match &request.arguments {
            Ok(arguments) => arguments.clone(),
            Err(e) => return Ok(failure(request, e.clone())),
        };
        let Some(handler) = self.registry.resolve(name) else {
            tracing::warn!(tool = %name, "model requested an unknown tool");
            return Ok(failure(request, ToolError::UnknownTool(name.clone())));
        };

        tracing::info!(tool = %name, source = %request.source, "executing tool");
        let timeout = self.config.tool_timeout;
        let ctx = ToolContext::new(cancel.child_token(), timeout);
        let task_ctx = ctx.clone();
        let task = tokio::task::spawn_blocking(move || handler(&arguments, &task_ctx));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                ctx.cancel.cancel();
                return Err(Error::Cancelled);
            }
            joined = tokio::time::timeout(timeout, task) => joined,
        };

        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join)) => Err(ToolError::Execution(join.to_string())),
            Err(_) => {
                ctx.cancel.cancel();
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                Err(ToolError::Timeout(millis))
            }
        };

        match outcome {
            Ok(output) => {
                tracing::debug!(tool = %name, bytes = output.len(), "tool finished");
                Ok(ToolCallResult {
                    request: request.clone(),
                    output,
                    succeeded: true,
                    error: None,
                })
            }
            Err(ToolError::Cancelled) if cancel.is_cancelled() => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool failed");
                Ok(failure(request, e))
            }
        }
    }

    fn request<'a>(&'a self, messages: &'a [Message], protocol: ToolProtocol) -> ModelRequest<'a> {
        let tools: &[ToolSpec] = match protocol {
            ToolProtocol::Native => self.registry.specs(),
            ToolProtocol::Textual => &[],
        };
        ModelRequest {
            messages,
            tools,
            options: self.config.options,
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        protocol: ToolProtocol,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse> {
        let request = self.request(messages, protocol);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            response = self.backend.call(request) => Ok(response?),
        }
    }

    fn turn_messages(
        &self,
        protocol: ToolProtocol,
        system: &str,
        history: &[Message],
        user: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        let system = match protocol {
            ToolProtocol::Native => system.to_string(),
            ToolProtocol::Textual => with_catalogue(system, self.registry.specs()),
        };
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(history);
        messages.push(Message::user(user));
        messages
    }
}

/// Append the textual tool catalogue to a system prompt, unless it already
/// carries one.
pub fn with_catalogue(system: &str, specs: &[ToolSpec]) -> String {
    if system.contains(CATALOGUE_HEADER) || specs.is_empty() {
        return system.to_string();
    }
    let mut prompt = String::from(system.trim_end());
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(CATALOGUE_HEADER);
    prompt.push_str(":\n");
    for spec in specs {
        prompt.push_str(&spec.catalogue_entry());
    }
    prompt.push_str(
        "\nTo use a tool, respond with only a JSON object naming the tool and its parameters, \
         for example:\n{\"tool\": \"<tool name>\", \"<parameter>\": \"<value>\"}\n\
         If no tool is needed, answer normally.",
    );
    prompt
}

/// Follow-up instruction carrying a tool result in the textual protocol.
pub fn follow_up(result: &str) -> String {
    format!("Tool execution result:\n{result}\n\nPlease provide a summary of the results.")
}

fn attach_catalogue(messages: &mut Vec<Message>, specs: &[ToolSpec]) {
    match messages.first_mut() {
        Some(Message::System { text }) => *text = with_catalogue(text, specs),
        _ => messages.insert(0, Message::system(with_catalogue("", specs))),
    }
}

/// Record a tool call and its result. Native calls get a dedicated tool
/// message; calls found in text get a follow-up user instruction.
fn append_result(
    messages: &mut Vec<Message>,
    response: &ModelResponse,
    request: &ToolCallRequest,
    output: &str,
) {
    let native = response
        .tool_calls
        .iter()
        .find(|call| Some(&call.id) == request.id.as_ref());
    match native {
        Some(call) => {
            messages.push(Message::assistant_with_calls(
                response.text.clone(),
                vec![call.clone()],
            ));
            messages.push(Message::tool_result(call.id.clone(), output));
        }
        None => {
            messages.push(Message::assistant(response.text.clone()));
            messages.push(Message::user(follow_up(output)));
        }
    }
}

fn failure(request: &ToolCallRequest, error: ToolError) -> ToolCallResult {
    let output = match &error {
        ToolError::UnknownTool(_) => format!("Error: {error}"),
        _ => format!("Error executing {}: {error}", request.function_name),
    };
    ToolCallResult {
        request: request.clone(),
        output,
        succeeded: false,
        error: Some(error),
    }
}

fn plain() -> ChatOutcome {
    ChatOutcome {
        thoughts: None,
        content: None,
        outcome: Outcome::PlainText,
    }
}
