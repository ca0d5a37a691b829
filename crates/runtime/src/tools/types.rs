//! Tool-related types.

use super::{ToolArguments, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Scalar type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// A single parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
    /// Allowed values, when the parameter is an enumeration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

/// A tool definition exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Parameters in declaration order.
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required,
            description: description.into(),
            allowed: Vec::new(),
        });
        self
    }

    /// Add a string parameter restricted to a fixed set of values.
    pub fn enum_param(
        mut self,
        name: impl Into<String>,
        allowed: &[&str],
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind: ParamType::String,
            required,
            description: description.into(),
            allowed: allowed.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// JSON Schema object describing the parameters.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = json!({
                "type": param.kind.as_str(),
                "description": param.description,
            });
            if !param.allowed.is_empty() {
                property["enum"] = json!(param.allowed);
            }
            properties.insert(param.name.clone(), property);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Human-readable entry for a textual tool catalogue.
    pub fn catalogue_entry(&self) -> String {
        let mut entry = format!("- {}: {}\n", self.name, self.description);
        for param in &self.params {
            let requirement = if param.required { "required" } else { "optional" };
            entry.push_str(&format!(
                "    - {} ({}, {requirement}): {}",
                param.name,
                param.kind.as_str(),
                param.description
            ));
            if !param.allowed.is_empty() {
                entry.push_str(&format!(" [one of: {}]", param.allowed.join(", ")));
            }
            entry.push('\n');
        }
        entry
    }
}

/// Context available to a handler while it runs.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Cancelled when the user aborts the turn.
    pub cancel: CancellationToken,
    /// Point in time after which the handler's result is discarded.
    pub deadline: Instant,
    /// Budget the deadline was computed from.
    pub timeout: Duration,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Whether the handler should stop work.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.expired()
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The error a handler returns when it stops early: a timeout once the
    /// deadline has passed, otherwise a cancellation.
    pub fn stop_error(&self) -> ToolError {
        if self.expired() {
            ToolError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            ToolError::Cancelled
        }
    }
}

/// A tool handler. Handlers may block; the dispatch loop runs them on the
/// blocking pool.
pub type ToolHandler =
    Arc<dyn Fn(&ToolArguments, &ToolContext) -> Result<String, ToolError> + Send + Sync>;
