//! Model protocol types and backend trait.

pub mod errors;
pub mod stream;
pub mod types;

pub use errors::ModelError;
pub use stream::{ChunkStream, StreamAccumulator, StreamChunk};
pub use types::{
    Backend, FinishReason, Message, ModelOptions, ModelRequest, ModelResponse, Role, ToolCall,
    Usage,
};
