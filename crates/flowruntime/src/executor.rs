use crate::{Action, ActionError, FlowId, TriggerKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Collaborator that performs the concrete effect of one action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run `action`. Both an `Err` and an outcome with `success == false`
    /// count as a failed action.
    async fn execute_action(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Why a flow execution was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub source: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerContext {
    pub fn manual() -> Self {
        Self {
            source: TriggerKind::Manual,
            file_path: None,
            pattern: None,
            timestamp: Utc::now(),
        }
    }

    pub fn file_change(file_path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            source: TriggerKind::FileChange,
            file_path: Some(file_path.into()),
            pattern: Some(pattern.into()),
            timestamp: Utc::now(),
        }
    }

    /// Final component of the triggering path, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
    }
}

impl Default for TriggerContext {
    fn default() -> Self {
        Self::manual()
    }
}

/// Everything an executor learns about the action it is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    pub flow_id: FlowId,
    pub execution_id: String,
    pub action_index: usize,
    pub trigger: TriggerContext,
}

/// Result contract of an executor call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// End the flow after this action without marking it failed.
    #[serde(default)]
    pub stop_flow: bool,
}

impl ActionOutcome {
    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            ..Self::default()
        }
    }

    /// Success without output.
    pub fn done() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn stop(mut self) -> Self {
        self.stop_flow = true;
        self
    }
}

impl From<ActionError> for ActionOutcome {
    fn from(e: ActionError) -> Self {
        ActionOutcome::failed(e.to_string())
    }
}
