//! Flow management runtime
//!
//! This crate stores user-defined automation flows, executes their actions
//! in order through a pluggable [`ActionExecutor`], and triggers
//! file-based flows when watched files change.

mod config;
mod definition;
mod error;
mod events;
mod executor;
mod manager;
mod pattern;
mod storage;
mod watcher;

pub use config::RuntimeConfig;
pub use definition::{
    Action, ActionKind, FlowDefinition, FlowFilter, FlowId, FlowUpdate, HttpMethod, Trigger,
    TriggerKind, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DELAY_MS, DEFAULT_HTTP_TIMEOUT_MS,
    DEFAULT_SCRIPT_TIMEOUT_MS,
};
pub use error::{ActionError, ConfigError, ManagerError, StorageError, WatcherError};
pub use events::{EventBus, ExecutionEmitter, ExecutionEvent};
pub use executor::{ActionContext, ActionExecutor, ActionOutcome, TriggerContext};
pub use manager::{
    ActionRecord, ExecutionReport, ExecutionStats, ExecutionStatus, FlowDetails, FlowManager,
    FlowStatistics, SearchHit,
};
pub use pattern::FilePattern;
pub use storage::{FlowStorage, InMemoryFlowStorage, JsonFileStorage};
pub use watcher::{FileWatcher, TriggerRecord, WatcherInfo, WatcherStatus};
