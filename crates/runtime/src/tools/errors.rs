use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while preparing or executing a tool call.
///
/// None of these abort a turn: the dispatch loop renders them as the tool's
/// result text so the model can react.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("cancelled")]
    Cancelled,
    #[error("execution failed: {0}")]
    Execution(String),
}
