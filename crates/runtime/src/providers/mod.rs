//! LLM provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod openai;

pub use openai::{DEFAULT_ENDPOINT, OpenAiBackend, OpenAiBackendBuilder, map_finish_reason};
