//! Toolcall runtime: tool-calling dispatch against a local model.
//!
//! This crate provides the pieces an agent needs to let a language model
//! call local tools: the model protocol and an OpenAI-compatible backend,
//! the tool registry with its argument extractor, the response interpreter,
//! the dispatch loop, and the conversation session.
//!
//! # Overview
//!
//! - **ToolRegistry**: name to (spec, handler) table, built once at startup.
//! - **interpret**: decides whether a model turn asked for a tool, from a
//!   native tool-call entry or a JSON object embedded in the text.
//! - **Dispatcher**: runs a turn (model, tool, model) or loops until the
//!   model stops requesting tools.
//! - **Session**: keeps the history of an interactive conversation.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{DispatchConfig, Dispatcher, OpenAiBackend, Session, ToolRegistry};
//! use runtime::tools::builtin::sms;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = OpenAiBackend::builder("phi-4-mini").build();
//! let mut registry = ToolRegistry::new();
//! sms::register(&mut registry);
//!
//! let dispatcher = Dispatcher::new(backend, Arc::new(registry), DispatchConfig::default());
//! let mut session = Session::new(dispatcher).with_system("You are a helpful assistant.");
//! let report = session.chat("Text 555-0100 that the order shipped", &CancellationToken::new()).await?;
//! println!("{}", report.text);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
mod error;
pub mod interpret;
pub mod model;
pub mod providers;
mod session;
pub mod tools;

pub use dispatch::{DispatchConfig, Dispatcher, ToolProtocol, TurnReport};
pub use error::{Error, Result};
pub use interpret::{
    CallSource, ChatOutcome, Outcome, ToolCallRequest, ToolCallResult, interpret,
};
pub use model::{Backend, FinishReason, Message, ModelError, ModelOptions, Role, ToolCall};
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use session::{Session, SessionId};
pub use tools::{ToolError, ToolRegistry, ToolSpec};
