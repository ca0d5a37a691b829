//! Interpretation of a model turn: reasoning, visible text and tool call.

use crate::model::{ModelResponse, ToolCall};
use crate::tools::{ToolArguments, ToolError, extract};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static THINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>").expect("valid think pattern")
});

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(.*?)```").expect("valid fence pattern")
});

/// Keys that may carry the tool name in a textual call, in lookup order.
const NAME_KEYS: [&str; 3] = ["tool", "function", "name"];

/// Keys that may wrap the arguments of a textual call.
const NESTED_ARG_KEYS: [&str; 2] = ["parameters", "arguments"];

/// Where a tool call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSource {
    /// A structured tool-call entry from the model client.
    Native,
    /// A JSON object embedded in the assistant text.
    ParsedFromText,
}

impl std::fmt::Display for CallSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::ParsedFromText => write!(f, "parsed from text"),
        }
    }
}

/// A tool call found in a model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub source: CallSource,
    /// Call id; only native calls carry one.
    pub id: Option<String>,
    pub function_name: String,
    /// Arguments as a serialized JSON object.
    pub raw_arguments: String,
    /// Result of running the argument extractor on `raw_arguments`.
    pub arguments: Result<ToolArguments, ToolError>,
}

impl ToolCallRequest {
    /// Wrap a structured call, running the extractor on its arguments.
    pub fn native(call: &ToolCall) -> Self {
        Self {
            source: CallSource::Native,
            id: Some(call.id.clone()),
            function_name: call.name.clone(),
            raw_arguments: call.arguments.clone(),
            arguments: extract(&call.arguments),
        }
    }

    /// Whether the arguments were parsed successfully.
    pub fn parsed(&self) -> bool {
        self.arguments.is_ok()
    }
}

/// Outcome of running a tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub request: ToolCallRequest,
    /// Text handed back to the model.
    pub output: String,
    pub succeeded: bool,
    pub error: Option<ToolError>,
}

/// What a turn amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    PlainText,
    ToolCallPending(ToolCallRequest),
    ToolCallCompleted(ToolCallResult),
}

/// Interpreted model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Inner text of the reasoning span, if any.
    pub thoughts: Option<String>,
    /// Text left after removing reasoning and, when it was the whole text,
    /// the embedded tool call.
    pub content: Option<String>,
    pub outcome: Outcome,
}

impl ChatOutcome {
    /// The tool call, pending or completed.
    pub fn tool_call(&self) -> Option<&ToolCallRequest> {
        match &self.outcome {
            Outcome::PlainText => None,
            Outcome::ToolCallPending(request) => Some(request),
            Outcome::ToolCallCompleted(result) => Some(&result.request),
        }
    }

    pub fn tool_result(&self) -> Option<&ToolCallResult> {
        match &self.outcome {
            Outcome::ToolCallCompleted(result) => Some(result),
            _ => None,
        }
    }

    /// Record the result of the pending call.
    pub(crate) fn complete(&mut self, result: ToolCallResult) {
        self.outcome = Outcome::ToolCallCompleted(result);
    }
}

/// Interpret one model turn.
///
/// Reasoning spans are always stripped first. A native tool call wins over
/// anything in the text; otherwise the visible text is scanned for an
/// embedded JSON call.
pub fn interpret(response: &ModelResponse) -> ChatOutcome {
    let (thoughts, visible) = split_reasoning(&response.text);

    if let Some(call) = response.tool_calls.first() {
        if response.tool_calls.len() > 1 {
            tracing::warn!(
                count = response.tool_calls.len(),
                "multiple native tool calls, using the first"
            );
        }
        return ChatOutcome {
            thoughts,
            content: non_empty(visible),
            outcome: Outcome::ToolCallPending(ToolCallRequest::native(call)),
        };
    }

    if !visible.is_empty() {
        if let Some((request, span)) = text_call(&visible) {
            let content = if span.trim() == visible {
                None
            } else {
                Some(visible)
            };
            return ChatOutcome {
                thoughts,
                content,
                outcome: Outcome::ToolCallPending(request),
            };
        }
    }

    ChatOutcome {
        thoughts,
        content: non_empty(visible),
        outcome: Outcome::PlainText,
    }
}

/// Separate reasoning spans from the visible text. The first span's inner
/// text becomes the thoughts; every span is removed.
pub fn split_reasoning(text: &str) -> (Option<String>, String) {
    let thoughts = THINK
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| non_empty(m.as_str().trim().to_string()));
    let visible = THINK.replace_all(text, "").trim().to_string();
    (thoughts, visible)
}

/// Locate the JSON span of a textual call: a `json` fence, else the first
/// `{` through the last `}`. Returns the JSON and the whole matched text,
/// fence included.
fn json_span(text: &str) -> Option<(&str, &str)> {
    if let Some(captures) = JSON_FENCE.captures(text) {
        if let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) {
            return Some((inner.as_str(), whole.as_str()));
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| (&text[start..=end], &text[start..=end]))
}

fn text_call(text: &str) -> Option<(ToolCallRequest, &str)> {
    let (json, span) = json_span(text)?;
    let object = match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return None,
        Err(e) => {
            tracing::debug!(error = %e, "assistant text holds no JSON tool call");
            return None;
        }
    };

    let (name, arguments) = call_parts(&object)?;
    let request = ToolCallRequest {
        source: CallSource::ParsedFromText,
        id: None,
        function_name: name,
        raw_arguments: arguments.to_json(),
        arguments: Ok(arguments),
    };
    Some((request, span))
}

/// Pull the tool name and arguments out of a textual call object.
fn call_parts(object: &Map<String, Value>) -> Option<(String, ToolArguments)> {
    let key = NAME_KEYS.iter().find(|key| object.contains_key(**key))?;

    match &object[*key] {
        Value::String(name) => {
            let rest: Vec<&String> = object
                .keys()
                .filter(|k| !NAME_KEYS.contains(&k.as_str()))
                .collect();
            if let [only] = rest.as_slice() {
                if let Some(nested) = nested_arguments(object, only) {
                    return Some((name.clone(), nested));
                }
            }
            let arguments = ToolArguments::from_object(object, &NAME_KEYS);
            (!arguments.is_empty()).then(|| (name.clone(), arguments))
        }
        // {"function": {"name": "X", "parameters": {...}}}
        Value::Object(function) => {
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = NESTED_ARG_KEYS
                .iter()
                .find_map(|key| nested_arguments(function, key))?;
            Some((name, arguments))
        }
        _ => None,
    }
}

fn nested_arguments(object: &Map<String, Value>, key: &str) -> Option<ToolArguments> {
    if !NESTED_ARG_KEYS.contains(&key) {
        return None;
    }
    match object.get(key)? {
        Value::Object(inner) => Some(ToolArguments::from_object(inner, &[])),
        _ => None,
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ArgValue;

    fn text(text: &str) -> ChatOutcome {
        interpret(&ModelResponse::text(text))
    }

    fn args(outcome: &ChatOutcome) -> &ToolArguments {
        outcome.tool_call().unwrap().arguments.as_ref().unwrap()
    }

    #[test]
    fn strips_reasoning_span() {
        let outcome = text("<think>plan</think>Hello");
        assert_eq!(outcome.thoughts.as_deref(), Some("plan"));
        assert_eq!(outcome.content.as_deref(), Some("Hello"));
        assert_eq!(outcome.outcome, Outcome::PlainText);
    }

    #[test]
    fn reasoning_span_is_multiline_and_non_greedy() {
        let outcome = text("<think>\nstep one\nstep two\n</think>\nA<think>more</think> B");
        assert_eq!(outcome.thoughts.as_deref(), Some("step one\nstep two"));
        assert_eq!(outcome.content.as_deref(), Some("A B"));
    }

    #[test]
    fn reasoning_only_leaves_no_content() {
        let outcome = text("<think>hmm</think>  ");
        assert_eq!(outcome.thoughts.as_deref(), Some("hmm"));
        assert_eq!(outcome.content, None);
    }

    #[test]
    fn unclosed_reasoning_is_left_alone() {
        let outcome = text("<think>never closed");
        assert_eq!(outcome.thoughts, None);
        assert_eq!(outcome.content.as_deref(), Some("<think>never closed"));
    }

    #[test]
    fn flat_text_call_clears_content() {
        let outcome = text(r#"{"tool":"SendSms","message":"hi","phoneNumber":"555"}"#);
        let call = outcome.tool_call().unwrap();
        assert_eq!(call.function_name, "SendSms");
        assert_eq!(call.source, CallSource::ParsedFromText);
        assert_eq!(call.id, None);
        assert_eq!(args(&outcome).get("message"), Some(&ArgValue::String("hi".into())));
        assert_eq!(
            args(&outcome).get("phoneNumber"),
            Some(&ArgValue::String("555".into()))
        );
        assert_eq!(args(&outcome).len(), 2);
        assert_eq!(outcome.content, None);
    }

    #[test]
    fn text_call_surrounded_by_prose_keeps_content() {
        let outcome =
            text(r#"Sure, sending it now: {"tool":"SendSms","message":"hi","phoneNumber":"555"}"#);
        assert_eq!(outcome.tool_call().unwrap().function_name, "SendSms");
        assert!(outcome.content.unwrap().starts_with("Sure, sending it now"));
    }

    #[test]
    fn fenced_json_is_preferred() {
        let outcome = text(
            "Example {not json}\n```json\n{\"name\":\"GetCurrentWeather\",\"location\":\"Boston\"}\n```",
        );
        let call = outcome.tool_call().unwrap();
        assert_eq!(call.function_name, "GetCurrentWeather");
        assert_eq!(args(&outcome).string("location").as_deref(), Some("Boston"));
    }

    #[test]
    fn fenced_only_call_clears_content() {
        let outcome = text(
            "```json\n{\"tool\":\"SendSms\",\"message\":\"hi\",\"phoneNumber\":\"555\"}\n```",
        );
        assert_eq!(outcome.tool_call().unwrap().function_name, "SendSms");
        assert_eq!(outcome.content, None);
    }

    #[test]
    fn fenced_call_with_prose_keeps_content() {
        let outcome = text(
            "Sending now.\n```json\n{\"tool\":\"SendSms\",\"message\":\"hi\",\"phoneNumber\":\"555\"}\n```",
        );
        assert_eq!(outcome.tool_call().unwrap().function_name, "SendSms");
        assert!(outcome.content.unwrap().starts_with("Sending now."));
    }

    #[test]
    fn name_keys_checked_in_order() {
        let outcome = text(r#"{"name":"B","tool":"A","x":1}"#);
        assert_eq!(outcome.tool_call().unwrap().function_name, "A");
        assert_eq!(args(&outcome).len(), 1);
    }

    #[test]
    fn name_without_arguments_is_not_a_call() {
        let outcome = text(r#"{"tool":"SendSms"}"#);
        assert_eq!(outcome.outcome, Outcome::PlainText);
        assert_eq!(outcome.content.as_deref(), Some(r#"{"tool":"SendSms"}"#));
    }

    #[test]
    fn nested_parameters_become_arguments() {
        let outcome = text(r#"{"tool":"SendSms","parameters":{"message":"hi","phoneNumber":"5"}}"#);
        assert_eq!(args(&outcome).string("message").as_deref(), Some("hi"));
        assert_eq!(args(&outcome).len(), 2);
    }

    #[test]
    fn function_object_form() {
        let outcome =
            text(r#"{"function":{"name":"GetCurrentLocation","parameters":{}}}"#);
        let call = outcome.tool_call().unwrap();
        assert_eq!(call.function_name, "GetCurrentLocation");
        assert!(args(&outcome).is_empty());
        assert_eq!(call.raw_arguments, "{}");
    }

    #[test]
    fn prose_with_braces_stays_plain() {
        let outcome = text("Use {curly} braces in set notation {a, b}.");
        assert_eq!(outcome.outcome, Outcome::PlainText);
        assert_eq!(
            outcome.content.as_deref(),
            Some("Use {curly} braces in set notation {a, b}.")
        );
    }

    #[test]
    fn native_call_wins_over_text() {
        let response = ModelResponse::tool_calls(
            r#"{"tool":"Other","x":"y"}"#,
            vec![ToolCall {
                id: "call_9".into(),
                name: "SendSms".into(),
                arguments: r#"{"message":"hi","phoneNumber":"555"}"#.into(),
            }],
        );
        let outcome = interpret(&response);
        let call = outcome.tool_call().unwrap();
        assert_eq!(call.source, CallSource::Native);
        assert_eq!(call.id.as_deref(), Some("call_9"));
        assert_eq!(call.function_name, "SendSms");
        assert!(call.parsed());
    }

    #[test]
    fn native_call_with_bad_arguments_is_unparsed() {
        let response = ModelResponse::tool_calls(
            "",
            vec![ToolCall {
                id: "1".into(),
                name: "SendSms".into(),
                arguments: "not json".into(),
            }],
        );
        let call = interpret(&response).tool_call().cloned().unwrap();
        assert!(!call.parsed());
        assert!(matches!(call.arguments, Err(ToolError::MalformedArguments(_))));
    }

    #[test]
    fn thoughts_are_stripped_before_text_call_scan() {
        let outcome = text(
            r#"<think>I should use {"tool":"Wrong","a":1}</think>{"tool":"SendSms","message":"m","phoneNumber":"1"}"#,
        );
        assert_eq!(outcome.tool_call().unwrap().function_name, "SendSms");
        assert_eq!(outcome.content, None);
        assert!(outcome.thoughts.unwrap().contains("Wrong"));
    }
}
