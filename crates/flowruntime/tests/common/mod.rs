// Shared fakes for the flowruntime integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use flowruntime::{
    Action, ActionContext, ActionError, ActionExecutor, ActionOutcome, FlowDefinition,
    FlowFilter, FlowId, FlowManager, FlowStorage, FlowUpdate, InMemoryFlowStorage,
    RuntimeConfig, StorageError,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// One executor call as seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub flow_id: FlowId,
    pub action_index: usize,
    pub label: String,
    pub file_path: Option<PathBuf>,
}

/// Executor that records every call. Command actions steer the outcome:
/// `fail` reports failure, `error` returns an `Err`, `stop` ends the flow,
/// `panic` panics. Anything else succeeds. Delay actions sleep.
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }

    pub fn calls_for(&self, flow_id: FlowId) -> usize {
        self.calls().iter().filter(|c| c.flow_id == flow_id).count()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute_action(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError> {
        let label = match action {
            Action::Command { command, .. } => command.clone(),
            Action::Delay { duration_ms } => format!("delay {}", duration_ms),
            other => other.kind().to_string(),
        };

        self.calls.lock().unwrap().push(Call {
            flow_id: ctx.flow_id,
            action_index: ctx.action_index,
            label: label.clone(),
            file_path: ctx.trigger.file_path.clone(),
        });

        if let Action::Delay { duration_ms } = action {
            tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            return Ok(ActionOutcome::done());
        }

        match label.as_str() {
            "fail" => Ok(ActionOutcome::failed("command exited with 1")),
            "error" => Err(ActionError::Failed("boom".to_string())),
            "stop" => Ok(ActionOutcome::done().stop()),
            "panic" => panic!("executor panicked"),
            _ => Ok(ActionOutcome::succeeded(json!({ "ran": label }))),
        }
    }
}

pub fn manager_with(executor: Arc<ScriptedExecutor>) -> Arc<FlowManager> {
    manager_with_config(executor, RuntimeConfig::default())
}

pub fn manager_with_config(
    executor: Arc<ScriptedExecutor>,
    config: RuntimeConfig,
) -> Arc<FlowManager> {
    init_tracing();
    Arc::new(FlowManager::with_config(
        Arc::new(InMemoryFlowStorage::new()),
        executor,
        config,
    ))
}

pub fn commands(labels: &[&str]) -> Vec<Action> {
    labels.iter().map(|l| Action::command(*l)).collect()
}

/// Storage whose backend is always down.
pub struct FailingStorage;

fn unavailable() -> StorageError {
    StorageError::Unavailable("backend offline".to_string())
}

#[async_trait]
impl FlowStorage for FailingStorage {
    async fn save(&self, _flow: FlowDefinition) -> Result<FlowId, StorageError> {
        Err(unavailable())
    }

    async fn find_by_id(&self, _id: FlowId) -> Result<Option<FlowDefinition>, StorageError> {
        Err(unavailable())
    }

    async fn find_all(&self, _filter: &FlowFilter) -> Result<Vec<FlowDefinition>, StorageError> {
        Err(unavailable())
    }

    async fn update(
        &self,
        _id: FlowId,
        _update: FlowUpdate,
    ) -> Result<FlowDefinition, StorageError> {
        Err(unavailable())
    }

    async fn delete(&self, _id: FlowId) -> Result<(), StorageError> {
        Err(unavailable())
    }
}

pub fn failing_manager(executor: Arc<ScriptedExecutor>) -> Arc<FlowManager> {
    init_tracing();
    Arc::new(FlowManager::new(Arc::new(FailingStorage), executor))
}
