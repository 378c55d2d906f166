use std::fmt;
use thiserror::Error;

/// Failure raised by a node's own lifecycle hook.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required param: {0}")]
    MissingParam(String),

    #[error("Invalid param type for '{field}': expected {expected}, got {actual}")]
    InvalidParamType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed(message.into())
    }
}

/// Lifecycle hook in which a node failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prep,
    Exec,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prep => f.write_str("prep"),
            Phase::Exec => f.write_str("exec"),
            Phase::Post => f.write_str("post"),
        }
    }
}

/// Failure of a whole chain traversal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Node '{node}' failed during {phase} at hop {hop}: {source}")]
    NodeFailed {
        node: String,
        phase: Phase,
        hop: usize,
        #[source]
        source: NodeError,
    },

    #[error("Chain exceeded the limit of {limit} hops")]
    HopLimitExceeded { limit: usize },
}

impl ChainError {
    /// The node error behind a failed traversal, if any.
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            ChainError::NodeFailed { source, .. } => Some(source),
            ChainError::HopLimitExceeded { .. } => None,
        }
    }
}
