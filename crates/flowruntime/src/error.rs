use crate::FlowId;
use thiserror::Error;

/// Failure reported by a `FlowStorage` implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Flow not found: {0}")]
    NotFound(FlowId),

    #[error("A flow named '{0}' already exists")]
    DuplicateName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure raised while running a single action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Action failed: {0}")]
    Failed(String),

    #[error("Action timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Failure of a Flow Manager operation.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("Cannot delete flow {0} with active executions")]
    ActiveExecutions(FlowId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ManagerError {
    pub(crate) fn validation(problems: Vec<String>) -> Self {
        ManagerError::Validation(problems.join(", "))
    }
}

/// Failure of a File Watcher operation.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to query file-based flows: {0}")]
    Query(#[from] ManagerError),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: String, reason: String },
}

/// Failure loading a runtime configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
