use crate::model::{FinishReason, ModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// The model stopped for a reason that makes its answer untrustworthy.
    #[error("model stopped with finish reason `{0}`")]
    FatalFinish(FinishReason),

    #[error("model still requesting tools after {0} rounds")]
    RoundLimit(usize),

    #[error("turn cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
