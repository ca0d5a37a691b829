//! Tool registry, argument extraction and the built-in tools.

mod args;
pub mod builtin;
pub mod errors;
mod registry;
mod types;

pub use args::{ArgValue, ToolArguments, extract};
pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use types::{ParamSpec, ParamType, ToolContext, ToolHandler, ToolSpec};
