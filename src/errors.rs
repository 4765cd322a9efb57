//! Central error types for edgelm.

use thiserror::Error;

/// Errors surfaced by the inference pipeline.
///
/// Collaborator failures (executor, tokenizer, sampler) are wrapped without
/// rewording so the original status text reaches the caller.
#[derive(Error, Debug)]
pub enum EdgeLmError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("executor error: {0}")]
    Executor(anyhow::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(anyhow::Error),

    #[error("sampler error: {0}")]
    Sampler(anyhow::Error),
}

impl EdgeLmError {
    /// True for the cancellation kind, regardless of message.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EdgeLmError::Cancelled(_))
    }

    /// True for caller-input errors.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, EdgeLmError::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, EdgeLmError>;
