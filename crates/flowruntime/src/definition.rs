use crate::pattern::FilePattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub type FlowId = Uuid;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_DELAY_MS: u64 = 1_000;

/// Named, storable description of a trigger and the actions it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Keep running the remaining actions after one fails.
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default = "first_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn enabled_by_default() -> bool {
    true
}

fn first_version() -> u32 {
    1
}

impl FlowDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        trigger: Trigger,
        actions: Vec<Action>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            trigger,
            actions,
            enabled: true,
            continue_on_error: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Enabled and triggered by file changes.
    pub fn is_file_based(&self) -> bool {
        self.enabled && self.trigger.kind() == TriggerKind::FileChange
    }

    /// Trim text fields and fill in trigger defaults.
    pub fn normalize(&mut self, default_watch_dir: &Path) {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.trigger.normalize(default_watch_dir);
    }

    /// Problems that make this definition unusable; empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("Flow name is required".to_string());
        }
        if let Trigger::FileChange { pattern, .. } = &self.trigger {
            if let Err(e) = FilePattern::parse(pattern) {
                problems.push(e.to_string());
            }
        }
        for (index, action) in self.actions.iter().enumerate() {
            if let Some(problem) = action.problem() {
                problems.push(format!("Action {}: {}", index + 1, problem));
            }
        }
        problems
    }

    /// Merge a partial update. Bumps the version and stamps `updated_at`.
    pub fn apply(&mut self, update: FlowUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(trigger) = update.trigger {
            self.trigger = trigger;
        }
        if let Some(actions) = update.actions {
            self.actions = actions;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(continue_on_error) = update.continue_on_error {
            self.continue_on_error = continue_on_error;
        }
        self.version += 1;
        self.updated_at = update.updated_at.unwrap_or_else(Utc::now);
    }
}

/// What causes a flow to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    FileChange {
        #[serde(default)]
        pattern: String,
        #[serde(default, alias = "watchDir")]
        watch_dir: PathBuf,
    },
}

impl Trigger {
    pub fn file_change(pattern: impl Into<String>, watch_dir: impl Into<PathBuf>) -> Self {
        Trigger::FileChange {
            pattern: pattern.into(),
            watch_dir: watch_dir.into(),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Manual => TriggerKind::Manual,
            Trigger::FileChange { .. } => TriggerKind::FileChange,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            Trigger::FileChange { pattern, .. } => Some(pattern),
            Trigger::Manual => None,
        }
    }

    pub(crate) fn normalize(&mut self, default_watch_dir: &Path) {
        if let Trigger::FileChange { pattern, watch_dir } = self {
            let trimmed = pattern.trim();
            *pattern = if trimmed.is_empty() {
                "*".to_string()
            } else {
                trimmed.to_string()
            };
            if watch_dir.as_os_str().is_empty() {
                *watch_dir = default_watch_dir.to_path_buf();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    FileChange,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Manual => f.write_str("manual"),
            TriggerKind::FileChange => f.write_str("file_change"),
        }
    }
}

/// One step of a flow. Each kind carries only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
        #[serde(default = "command_timeout")]
        timeout_ms: u64,
    },
    Http {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
        #[serde(default = "http_timeout")]
        timeout_ms: u64,
    },
    Script {
        script: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "script_timeout")]
        timeout_ms: u64,
    },
    Delay {
        #[serde(default = "delay_duration")]
        duration_ms: u64,
    },
}

fn command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn script_timeout() -> u64 {
    DEFAULT_SCRIPT_TIMEOUT_MS
}

fn delay_duration() -> u64 {
    DEFAULT_DELAY_MS
}

impl Action {
    pub fn command(command: impl Into<String>) -> Self {
        Action::Command {
            command: command.into(),
            working_dir: None,
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }

    pub fn http(method: HttpMethod, url: impl Into<String>) -> Self {
        Action::Http {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }

    pub fn script(script: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Action::Script {
            script: script.into(),
            args,
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
        }
    }

    pub fn delay(duration_ms: u64) -> Self {
        Action::Delay { duration_ms }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Command { .. } => ActionKind::Command,
            Action::Http { .. } => ActionKind::Http,
            Action::Script { .. } => ActionKind::Script,
            Action::Delay { .. } => ActionKind::Delay,
        }
    }

    fn problem(&self) -> Option<String> {
        match self {
            Action::Command { command, .. } if command.trim().is_empty() => {
                Some("command must not be empty".to_string())
            }
            Action::Http { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Some(format!("invalid url '{}'", url))
            }
            Action::Script { script, .. } if script.as_os_str().is_empty() => {
                Some("script path must not be empty".to_string())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Command,
    Http,
    Script,
    Delay,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Command => "command",
            ActionKind::Http => "http",
            ActionKind::Script => "script",
            ActionKind::Delay => "delay",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Partial update of a flow definition. Identity, creation time and version
/// are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    /// Set by the manager, never read from input.
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FlowUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.trigger.is_none()
            && self.actions.is_none()
            && self.enabled.is_none()
            && self.continue_on_error.is_none()
    }
}

/// Selection applied by `FlowStorage::find_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowFilter {
    pub enabled: Option<bool>,
    pub trigger: Option<TriggerKind>,
    pub name_contains: Option<String>,
}

impl FlowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_name(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn matches(&self, flow: &FlowDefinition) -> bool {
        if self.enabled.is_some_and(|enabled| flow.enabled != enabled) {
            return false;
        }
        if self.trigger.is_some_and(|kind| flow.trigger.kind() != kind) {
            return false;
        }
        match &self.name_contains {
            Some(fragment) => flow
                .name
                .to_lowercase()
                .contains(&fragment.to_lowercase()),
            None => true,
        }
    }
}
