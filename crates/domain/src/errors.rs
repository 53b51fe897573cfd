//! Error types used throughout the delivery fabric.
//!
//! Every fallible operation in the fabric ultimately resolves to one of the
//! six kinds in [`ErrorKind`]; retry policy switches on that classification
//! rather than matching error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The six error kinds the delivery fabric distinguishes. See spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retry with backoff; the failure is expected to clear on its own.
    TransientIo,
    /// Surface to the operator; do not retry until they intervene.
    Auth,
    /// Drop with a warning; the input could not be parsed or understood.
    MalformedInput,
    /// Surface and stop producing; a resource (queue, disk) is exhausted.
    ResourceExhausted,
    /// Retry with backoff; the operation exceeded its deadline.
    Timeout,
    /// Propagate shutdown; do not retry.
    Cancelled,
}

/// Implemented by every error type the fabric can return so retry policy can
/// classify a failure without string matching.
pub trait ErrorClassification {
    fn kind(&self) -> ErrorKind;

    /// Whether the operation that produced this error should be retried.
    fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientIo | ErrorKind::Timeout)
    }
}

/// Top-level error type for the delivery fabric.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("queue error: {0}")]
    Queue(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("fallback channel error: {0}")]
    Fallback(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorClassification for AgentError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Queue(_) | Self::Transport(_) | Self::Fallback(_) => ErrorKind::TransientIo,
            Self::Auth(_) => ErrorKind::Auth,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) | Self::Scheduler(_) | Self::Internal(_) => ErrorKind::TransientIo,
        }
    }
}

/// Result type alias for fabric operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_timeout_kinds_are_retryable() {
        assert!(AgentError::Queue("x".into()).is_retryable());
        assert!(AgentError::Timeout("x".into()).is_retryable());
    }

    #[test]
    fn auth_and_malformed_are_not_retryable() {
        assert!(!AgentError::Auth("x".into()).is_retryable());
        assert!(!AgentError::MalformedInput("x".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }
}
