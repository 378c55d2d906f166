use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the flow runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the execution event channel.
    pub event_buffer_size: usize,
    /// Executions kept in the manager's history.
    pub history_limit: usize,
    /// Watch directory for file-change triggers that name none.
    pub default_watch_dir: PathBuf,
    /// Quiet period over which OS events for the same file are coalesced.
    pub debounce_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            history_limit: 100,
            default_watch_dir: PathBuf::from("./"),
            debounce_ms: 100,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
