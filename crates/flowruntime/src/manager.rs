use crate::events::{EventBus, ExecutionEmitter, ExecutionEvent};
use crate::{
    Action, ActionContext, ActionExecutor, ActionKind, ActionOutcome, FlowDefinition,
    FlowFilter, FlowId, FlowStorage, FlowUpdate, ManagerError, RuntimeConfig, Trigger,
    TriggerContext, TriggerKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Terminal state of one flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Outcome of one action attempt within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_index: usize,
    pub kind: ActionKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Result of executing a flow that was found in storage.
///
/// `completed` is true only when every attempted action succeeded. A failed
/// action is reported here rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub flow_id: FlowId,
    pub flow_name: String,
    pub status: ExecutionStatus,
    pub completed: bool,
    pub results: Vec<ActionRecord>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trigger: TriggerContext,
    pub started_at: DateTime<Utc>,
}

/// Counters kept by a manager since it was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub active: u64,
    pub last_execution_at: Option<DateTime<Utc>>,
}

/// Success figures for one flow over the recorded history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStatistics {
    pub total_executions: usize,
    pub completed_executions: usize,
    pub failed_executions: usize,
    /// Percentage rounded to two decimals.
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDetails {
    pub flow: FlowDefinition,
    pub statistics: FlowStatistics,
    pub recent_executions: Vec<ExecutionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub flow: FlowDefinition,
    pub relevance: u32,
}

#[derive(Default)]
struct Monitor {
    stats: ExecutionStats,
    history: VecDeque<ExecutionReport>,
    active: HashMap<FlowId, usize>,
}

impl Monitor {
    fn release(&mut self, id: FlowId) {
        if let Some(count) = self.active.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(&id);
            }
        }
        self.stats.active = self.stats.active.saturating_sub(1);
    }

    fn record(&mut self, completed: bool, started_at: DateTime<Utc>) {
        let stats = &mut self.stats;
        stats.total += 1;
        if completed {
            stats.completed += 1;
        } else {
            stats.failed += 1;
        }
        stats.last_execution_at = Some(started_at);
    }
}

/// Marks one execution as in flight until it is finished or dropped.
///
/// Dropping an unfinished run (executor panic, cancelled future) releases
/// the flow and counts the run as failed.
struct ActiveRun<'a> {
    monitor: &'a Mutex<Monitor>,
    flow_id: FlowId,
    started_at: DateTime<Utc>,
    history_limit: usize,
    finished: bool,
}

impl ActiveRun<'_> {
    fn finish(mut self, report: &ExecutionReport) {
        let mut monitor = lock(self.monitor);
        monitor.release(report.flow_id);
        monitor.record(report.completed, report.started_at);
        monitor.history.push_front(report.clone());
        monitor.history.truncate(self.history_limit);
        self.finished = true;
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!("Execution of flow {} aborted before completion", self.flow_id);
        let mut monitor = lock(self.monitor);
        monitor.release(self.flow_id);
        monitor.record(false, self.started_at);
    }
}

fn lock(monitor: &Mutex<Monitor>) -> MutexGuard<'_, Monitor> {
    monitor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates flow definitions: define, update, delete, query, execute.
pub struct FlowManager {
    storage: Arc<dyn FlowStorage>,
    executor: Arc<dyn ActionExecutor>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    monitor: Mutex<Monitor>,
}

impl FlowManager {
    pub fn new(storage: Arc<dyn FlowStorage>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self::with_config(storage, executor, RuntimeConfig::default())
    }

    pub fn with_config(
        storage: Arc<dyn FlowStorage>,
        executor: Arc<dyn ActionExecutor>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            storage,
            executor,
            event_bus,
            config,
            monitor: Mutex::new(Monitor::default()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Create and store a new enabled flow.
    pub async fn define_flow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        trigger: Trigger,
        actions: Vec<Action>,
    ) -> Result<FlowId, ManagerError> {
        self.define(FlowDefinition::new(name, description, trigger, actions))
            .await
    }

    /// Store a complete definition. Identity, version and timestamps are
    /// assigned here regardless of what the caller filled in.
    pub async fn define(&self, mut flow: FlowDefinition) -> Result<FlowId, ManagerError> {
        flow.normalize(&self.config.default_watch_dir);
        tracing::info!("Defining flow '{}'", flow.name);

        let problems = flow.problems();
        if !problems.is_empty() {
            tracing::warn!("Rejected flow definition: {}", problems.join(", "));
            return Err(ManagerError::validation(problems));
        }

        let now = Utc::now();
        flow.id = Uuid::new_v4();
        flow.version = 1;
        flow.created_at = now;
        flow.updated_at = now;

        let action_count = flow.actions.len();
        let id = self.storage.save(flow).await?;
        tracing::info!("Flow {} defined with {} actions", id, action_count);
        Ok(id)
    }

    pub async fn get_flow(&self, id: FlowId) -> Result<FlowDefinition, ManagerError> {
        self.storage
            .find_by_id(id)
            .await?
            .ok_or(ManagerError::FlowNotFound(id))
    }

    /// Apply a partial update to an existing flow.
    pub async fn update_flow(
        &self,
        id: FlowId,
        mut update: FlowUpdate,
    ) -> Result<FlowDefinition, ManagerError> {
        if update.is_empty() {
            return Err(ManagerError::Validation(
                "Update contains no fields".to_string(),
            ));
        }
        let existing = self.get_flow(id).await?;

        if let Some(name) = update.name.as_mut() {
            *name = name.trim().to_string();
        }
        if let Some(description) = update.description.as_mut() {
            *description = description.trim().to_string();
        }
        if let Some(trigger) = update.trigger.as_mut() {
            trigger.normalize(&self.config.default_watch_dir);
        }

        let mut candidate = existing;
        candidate.apply(update.clone());
        let problems = candidate.problems();
        if !problems.is_empty() {
            tracing::warn!("Rejected update of flow {}: {}", id, problems.join(", "));
            return Err(ManagerError::validation(problems));
        }

        update.updated_at = Some(Utc::now());
        let flow = self.storage.update(id, update).await?;
        tracing::info!("Flow {} updated to version {}", id, flow.version);
        Ok(flow)
    }

    pub async fn enable_flow(&self, id: FlowId) -> Result<FlowDefinition, ManagerError> {
        tracing::info!("Enabling flow {}", id);
        self.update_flow(id, FlowUpdate::enabled(true)).await
    }

    pub async fn disable_flow(&self, id: FlowId) -> Result<FlowDefinition, ManagerError> {
        tracing::info!("Disabling flow {}", id);
        self.update_flow(id, FlowUpdate::enabled(false)).await
    }

    /// Remove a flow. Refused while one of its executions is in flight.
    pub async fn delete_flow(&self, id: FlowId) -> Result<(), ManagerError> {
        self.get_flow(id).await?;

        if self.active_executions(id).await > 0 {
            tracing::warn!("Refusing to delete flow {} with active executions", id);
            return Err(ManagerError::ActiveExecutions(id));
        }

        self.storage.delete(id).await?;
        tracing::info!("Flow {} deleted", id);
        Ok(())
    }

    /// Flows matching `filter`, newest first.
    pub async fn list_flows(&self, filter: &FlowFilter) -> Result<Vec<FlowDefinition>, ManagerError> {
        let mut flows = self.storage.find_all(filter).await?;
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!("Found {} flows", flows.len());
        Ok(flows)
    }

    /// Enabled flows with a file-change trigger.
    pub async fn file_based_flows(&self) -> Result<Vec<FlowDefinition>, ManagerError> {
        let filter = FlowFilter::all()
            .with_enabled(true)
            .with_trigger(TriggerKind::FileChange);
        let flows: Vec<_> = self
            .storage
            .find_all(&filter)
            .await?
            .into_iter()
            .filter(FlowDefinition::is_file_based)
            .collect();
        tracing::debug!("Found {} active file-based flows", flows.len());
        Ok(flows)
    }

    /// Flows whose name, description or action kinds mention `query`, most
    /// relevant first.
    pub async fn search_flows(&self, query: &str) -> Result<Vec<SearchHit>, ManagerError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Err(ManagerError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        let mut hits: Vec<SearchHit> = self
            .storage
            .find_all(&FlowFilter::all())
            .await?
            .into_iter()
            .filter_map(|flow| {
                let relevance = relevance(&flow, &query);
                (relevance > 0).then_some(SearchHit { flow, relevance })
            })
            .collect();
        hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));

        tracing::debug!("Found {} flows matching '{}'", hits.len(), query);
        Ok(hits)
    }

    /// Execute every action of a flow in order.
    ///
    /// Returns `Err` only when the flow cannot be loaded. The first failing
    /// action stops the run unless the flow sets `continue_on_error`.
    pub async fn execute_flow(
        &self,
        id: FlowId,
        trigger: TriggerContext,
    ) -> Result<ExecutionReport, ManagerError> {
        let execution_id = new_execution_id();
        tracing::info!(
            "Beginning execution {} for flow {} (triggered by {})",
            execution_id,
            id,
            trigger.source
        );

        let flow = match self.storage.find_by_id(id).await? {
            Some(flow) => flow,
            None => {
                tracing::error!("Flow {} not found", id);
                return Err(ManagerError::FlowNotFound(id));
            }
        };

        let run = self.begin(id);
        let report = self.run_actions(&flow, execution_id, trigger).await;
        run.finish(&report);

        Ok(report)
    }

    async fn run_actions(
        &self,
        flow: &FlowDefinition,
        execution_id: String,
        trigger: TriggerContext,
    ) -> ExecutionReport {
        let emitter = self.event_bus.create_emitter(execution_id.as_str());
        let started_at = Utc::now();
        let start = Instant::now();

        self.event_bus.emit(ExecutionEvent::FlowStarted {
            execution_id: execution_id.clone(),
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            timestamp: started_at,
        });
        tracing::info!(
            "Executing flow '{}' with {} actions",
            flow.name,
            flow.actions.len()
        );

        let total = flow.actions.len();
        let mut results = Vec::with_capacity(total);
        let mut first_error = None;

        for (index, action) in flow.actions.iter().enumerate() {
            let ctx = ActionContext {
                flow_id: flow.id,
                execution_id: execution_id.clone(),
                action_index: index,
                trigger: trigger.clone(),
            };

            let (record, stop_flow) = self.run_action(&emitter, action, &ctx, total).await;

            let failed = !record.success;
            if failed && first_error.is_none() {
                first_error = record.error.clone();
            }
            results.push(record);

            if failed && !flow.continue_on_error {
                tracing::warn!("Stopping flow '{}' after action {} failed", flow.name, index + 1);
                break;
            }
            if stop_flow {
                tracing::info!("Flow '{}' stopped early by action {}", flow.name, index + 1);
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let completed = results.iter().all(|r: &ActionRecord| r.success);
        let succeeded = results.iter().filter(|r| r.success).count();

        if completed {
            tracing::info!("Execution {} completed in {}ms", execution_id, duration_ms);
        } else {
            tracing::warn!("Execution {} failed after {}ms", execution_id, duration_ms);
        }
        tracing::info!(
            "Actions executed={}, succeeded={}, failed={}",
            results.len(),
            succeeded,
            results.len() - succeeded
        );

        self.event_bus.emit(ExecutionEvent::FlowCompleted {
            execution_id: execution_id.clone(),
            flow_id: flow.id,
            completed,
            duration_ms,
            timestamp: Utc::now(),
        });

        ExecutionReport {
            execution_id,
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            status: if completed {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Failed
            },
            completed,
            results,
            duration_ms,
            error: if completed { None } else { first_error },
            trigger,
            started_at,
        }
    }

    async fn run_action(
        &self,
        emitter: &ExecutionEmitter,
        action: &Action,
        ctx: &ActionContext,
        total: usize,
    ) -> (ActionRecord, bool) {
        let index = ctx.action_index;
        let kind = action.kind();

        tracing::debug!("Delegating action {}/{} ({}) to executor", index + 1, total, kind);
        emitter.action_started(index, kind);

        let start = Instant::now();
        let outcome = self.executor.execute_action(action, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let ActionOutcome {
            success,
            output,
            error,
            stop_flow,
        } = outcome.unwrap_or_else(ActionOutcome::from);

        let error = match (success, error) {
            (false, None) => Some(format!("{} action reported failure", kind)),
            (_, error) => error,
        };
        let record = ActionRecord {
            action_index: index,
            kind,
            success,
            output,
            error,
            duration_ms,
        };

        if record.success {
            tracing::debug!("Action {} completed in {}ms", index + 1, duration_ms);
            emitter.action_completed(index, duration_ms);
        } else {
            let error = record.error.clone().unwrap_or_default();
            tracing::warn!("Action {} failed: {}", index + 1, error);
            emitter.action_failed(index, error);
        }

        (record, stop_flow)
    }

    fn begin(&self, id: FlowId) -> ActiveRun<'_> {
        let mut monitor = lock(&self.monitor);
        *monitor.active.entry(id).or_insert(0) += 1;
        monitor.stats.active += 1;
        ActiveRun {
            monitor: &self.monitor,
            flow_id: id,
            started_at: Utc::now(),
            history_limit: self.config.history_limit,
            finished: false,
        }
    }

    /// Executions of `id` currently in flight.
    pub async fn active_executions(&self, id: FlowId) -> usize {
        lock(&self.monitor).active.get(&id).copied().unwrap_or(0)
    }

    pub async fn stats(&self) -> ExecutionStats {
        lock(&self.monitor).stats.clone()
    }

    /// Recorded executions, newest first, optionally for one flow only.
    pub async fn history(&self, flow_id: Option<FlowId>, limit: usize) -> Vec<ExecutionReport> {
        lock(&self.monitor)
            .history
            .iter()
            .filter(|r| flow_id.map_or(true, |id| r.flow_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// A flow with its success figures over the recorded history.
    pub async fn flow_details(&self, id: FlowId) -> Result<FlowDetails, ManagerError> {
        let flow = self.get_flow(id).await?;
        let executions = self.history(Some(id), usize::MAX).await;

        let total = executions.len();
        let completed = executions.iter().filter(|r| r.completed).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            ((completed as f64 / total as f64) * 10_000.0).round() / 100.0
        };

        Ok(FlowDetails {
            flow,
            statistics: FlowStatistics {
                total_executions: total,
                completed_executions: completed,
                failed_executions: total - completed,
                success_rate,
            },
            recent_executions: executions.into_iter().take(3).collect(),
        })
    }
}

fn new_execution_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("exec-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

fn relevance(flow: &FlowDefinition, query: &str) -> u32 {
    let mut score = 0;
    if flow.name.to_lowercase().contains(query) {
        score += 10;
    }
    if flow.description.to_lowercase().contains(query) {
        score += 5;
    }
    if flow.actions.iter().any(|a| a.kind().as_str().contains(query)) {
        score += 3;
    }
    score
}
