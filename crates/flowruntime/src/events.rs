use crate::{ActionKind, FlowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Events emitted while flows are triggered and executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: String,
        flow_id: FlowId,
        flow_name: String,
        timestamp: DateTime<Utc>,
    },
    ActionStarted {
        execution_id: String,
        action_index: usize,
        kind: ActionKind,
        timestamp: DateTime<Utc>,
    },
    ActionCompleted {
        execution_id: String,
        action_index: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ActionFailed {
        execution_id: String,
        action_index: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        execution_id: String,
        flow_id: FlowId,
        completed: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    FileChanged {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    FlowTriggered {
        pattern: String,
        flow_id: FlowId,
        path: PathBuf,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Emitter bound to one flow execution
#[derive(Clone)]
pub struct ExecutionEmitter {
    execution_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl ExecutionEmitter {
    pub fn action_started(&self, action_index: usize, kind: ActionKind) {
        let _ = self.sender.send(ExecutionEvent::ActionStarted {
            execution_id: self.execution_id.clone(),
            action_index,
            kind,
            timestamp: Utc::now(),
        });
    }

    pub fn action_completed(&self, action_index: usize, duration_ms: u64) {
        let _ = self.sender.send(ExecutionEvent::ActionCompleted {
            execution_id: self.execution_id.clone(),
            action_index,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn action_failed(&self, action_index: usize, error: impl Into<String>) {
        let _ = self.sender.send(ExecutionEvent::ActionFailed {
            execution_id: self.execution_id.clone(),
            action_index,
            error: error.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Broadcast bus for execution events. Sending never blocks and is a no-op
/// without subscribers.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: impl Into<String>) -> ExecutionEmitter {
        ExecutionEmitter {
            execution_id: execution_id.into(),
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
