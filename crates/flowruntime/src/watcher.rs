use crate::events::ExecutionEvent;
use crate::pattern::FilePattern;
use crate::{FlowDefinition, FlowId, FlowManager, Trigger, TriggerContext, WatcherError};
use chrono::{DateTime, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Outcome of the last flow execution started by a watcher entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub pattern: String,
    pub flow_id: FlowId,
    pub flow_name: String,
    pub file_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Public view of one watcher entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherInfo {
    pub pattern: String,
    pub flow_id: FlowId,
    pub flow_name: String,
    pub watch_dir: PathBuf,
    pub last_trigger: Option<TriggerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub is_active: bool,
    pub watcher_count: usize,
    pub patterns: Vec<String>,
    pub watchers: Vec<WatcherInfo>,
    /// Directories with an open OS watch, sorted.
    pub watched_dirs: Vec<PathBuf>,
}

/// A change reported by the OS watch on `dir`, relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OsChange {
    dir: PathBuf,
    path: PathBuf,
}

struct WatcherEntry {
    pattern: FilePattern,
    flow_id: FlowId,
    flow_name: String,
    watch_dir: PathBuf,
    last_trigger: Option<TriggerRecord>,
}

/// OS watch on one directory, shared by every entry that names it.
struct DirWatch {
    _handle: Mutex<RecommendedWatcher>,
    users: usize,
}

#[derive(Default)]
struct WatcherState {
    active: bool,
    entries: Vec<WatcherEntry>,
    dirs: HashMap<PathBuf, DirWatch>,
}

/// Matches file changes against the patterns of file-triggered flows and
/// runs every flow whose pattern matches.
pub struct FileWatcher {
    manager: Arc<FlowManager>,
    state: RwLock<WatcherState>,
    os_events: Option<mpsc::UnboundedSender<OsChange>>,
}

impl FileWatcher {
    /// Watcher driven only by `simulate_file_change`.
    pub fn new(manager: Arc<FlowManager>) -> Self {
        Self {
            manager,
            state: RwLock::new(WatcherState::default()),
            os_events: None,
        }
    }

    /// Watcher that also receives OS file-system events for the watch
    /// directories of its entries. The returned task feeds those events to
    /// the entries of the directory they came from until the watcher is
    /// dropped. Events for the same file are coalesced over the manager's
    /// `debounce_ms`.
    pub fn with_os_events(manager: Arc<FlowManager>) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let window = manager.config().debounce();
        let watcher = Arc::new(Self {
            manager,
            state: RwLock::new(WatcherState::default()),
            os_events: Some(tx),
        });

        let task = tokio::spawn(dispatch_os_events(Arc::downgrade(&watcher), rx, window));
        (watcher, task)
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    /// Register every enabled file-change flow and start accepting events.
    /// Returns the number of registered entries.
    pub async fn start_watching(&self) -> Result<usize, WatcherError> {
        tracing::info!("Starting file system monitoring");

        let flows = self.manager.file_based_flows().await?;
        self.state.write().await.active = true;

        for flow in &flows {
            if let Err(e) = self.add_watcher(flow).await {
                tracing::error!("Skipping flow '{}': {}", flow.name, e);
            }
        }

        let count = self.state.read().await.entries.len();
        tracing::info!("Monitoring {} file patterns", count);
        Ok(count)
    }

    /// Release every entry and stop accepting events.
    pub async fn stop_watching(&self) {
        tracing::info!("Stopping file system monitoring");

        let mut state = self.state.write().await;
        state.active = false;
        for entry in state.entries.drain(..) {
            tracing::debug!("Stopped watching pattern: {}", entry.pattern);
        }
        for (dir, _) in state.dirs.drain() {
            tracing::debug!("Closed OS watch on {}", dir.display());
        }

        tracing::info!("All file watchers stopped");
    }

    /// Rebuild the entry set from the flows currently in storage.
    pub async fn refresh_watchers(&self) -> Result<usize, WatcherError> {
        tracing::info!("Refreshing file watchers");
        self.stop_watching().await;
        let count = self.start_watching().await?;
        tracing::info!("File watchers refreshed");
        Ok(count)
    }

    /// Register one flow. Returns `false` for flows that are disabled or not
    /// triggered by file changes. An entry with the same pattern is replaced.
    pub async fn add_watcher(&self, flow: &FlowDefinition) -> Result<bool, WatcherError> {
        let Trigger::FileChange { pattern, watch_dir } = &flow.trigger else {
            return Ok(false);
        };
        if !flow.enabled {
            tracing::debug!("Not watching disabled flow '{}'", flow.name);
            return Ok(false);
        }

        tracing::info!("Adding watcher for pattern \"{}\" (flow: {})", pattern, flow.name);

        let pattern = FilePattern::parse(pattern)?;
        let watch_dir = if watch_dir.as_os_str().is_empty() {
            self.manager.config().default_watch_dir.clone()
        } else {
            watch_dir.clone()
        };

        let mut state = self.state.write().await;
        self.acquire_dir(&mut state, &watch_dir)?;

        let entry = WatcherEntry {
            pattern,
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            watch_dir,
            last_trigger: None,
        };

        let existing = state
            .entries
            .iter()
            .position(|e| e.pattern.as_str() == entry.pattern.as_str());
        match existing {
            Some(index) => {
                tracing::warn!("Pattern \"{}\" was already watched; replacing", entry.pattern);
                let old = std::mem::replace(&mut state.entries[index], entry);
                release_dir(&mut state, &old.watch_dir);
            }
            None => state.entries.push(entry),
        }

        Ok(true)
    }

    /// Unregister a pattern. Returns whether it was registered.
    pub async fn remove_watcher(&self, pattern: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(index) = state.entries.iter().position(|e| e.pattern.as_str() == pattern) else {
            return false;
        };

        let entry = state.entries.remove(index);
        release_dir(&mut state, &entry.watch_dir);
        tracing::info!("Stopped watching pattern: {}", pattern);
        true
    }

    /// Feed a file change as if the OS had reported it. Every entry is
    /// matched, whatever its watch directory.
    pub async fn simulate_file_change(&self, path: impl AsRef<Path>) -> Vec<TriggerRecord> {
        self.handle_file_change(path.as_ref()).await
    }

    /// Run the flow of every entry whose pattern matches `path`, one after
    /// another. Changes arriving while inactive are dropped.
    pub async fn handle_file_change(&self, path: &Path) -> Vec<TriggerRecord> {
        self.dispatch_change(None, path).await
    }

    /// Same as `handle_file_change`, restricted to entries watching `dir`.
    async fn handle_os_change(&self, change: &OsChange) -> Vec<TriggerRecord> {
        self.dispatch_change(Some(&change.dir), &change.path).await
    }

    async fn dispatch_change(&self, dir: Option<&Path>, path: &Path) -> Vec<TriggerRecord> {
        let candidate = path.to_string_lossy();

        let matched: Vec<(String, FlowId, String)> = {
            let state = self.state.read().await;
            if !state.active {
                tracing::info!("File change ignored - watcher not active: {}", path.display());
                return Vec::new();
            }

            tracing::info!("File change detected: {}", path.display());
            state
                .entries
                .iter()
                .filter(|e| dir.map_or(true, |dir| e.watch_dir == dir))
                .filter(|e| e.pattern.matches(&candidate))
                .map(|e| (e.pattern.to_string(), e.flow_id, e.flow_name.clone()))
                .collect()
        };

        self.manager.event_bus().emit(ExecutionEvent::FileChanged {
            path: path.to_path_buf(),
            timestamp: Utc::now(),
        });

        let mut records = Vec::with_capacity(matched.len());
        for (pattern, flow_id, flow_name) in matched {
            tracing::debug!("File \"{}\" matches pattern \"{}\"", candidate, pattern);

            let record = self.trigger_flow(&pattern, flow_id, &flow_name, path).await;

            let mut state = self.state.write().await;
            if let Some(entry) = state
                .entries
                .iter_mut()
                .find(|e| e.pattern.as_str() == pattern && e.flow_id == flow_id)
            {
                entry.last_trigger = Some(record.clone());
            }
            drop(state);

            records.push(record);
        }

        records
    }

    async fn trigger_flow(
        &self,
        pattern: &str,
        flow_id: FlowId,
        flow_name: &str,
        path: &Path,
    ) -> TriggerRecord {
        tracing::info!(
            "Triggering flow \"{}\" due to file change: {}",
            flow_name,
            path.display()
        );

        let context = TriggerContext::file_change(path, pattern);
        let timestamp = context.timestamp;
        let manager = self.manager.clone();

        // A panicking executor must not take the watcher down with it.
        let outcome = tokio::spawn(async move { manager.execute_flow(flow_id, context).await }).await;

        let (success, execution_id, error) = match outcome {
            Ok(Ok(report)) if report.completed => {
                tracing::info!(
                    "Flow \"{}\" executed successfully ({})",
                    flow_name,
                    report.execution_id
                );
                (true, Some(report.execution_id), None)
            }
            Ok(Ok(report)) => {
                tracing::warn!(
                    "Flow \"{}\" execution failed - {}",
                    flow_name,
                    report.error.as_deref().unwrap_or("unknown error")
                );
                (false, Some(report.execution_id), report.error)
            }
            Ok(Err(e)) => {
                tracing::error!("Flow \"{}\" could not be executed - {}", flow_name, e);
                (false, None, Some(e.to_string()))
            }
            Err(e) => {
                tracing::error!("Flow trigger failed - {}", e);
                (false, None, Some(format!("Flow trigger failed: {}", e)))
            }
        };

        self.manager.event_bus().emit(ExecutionEvent::FlowTriggered {
            pattern: pattern.to_string(),
            flow_id,
            path: path.to_path_buf(),
            success,
            timestamp: Utc::now(),
        });

        TriggerRecord {
            pattern: pattern.to_string(),
            flow_id,
            flow_name: flow_name.to_string(),
            file_path: path.to_path_buf(),
            timestamp,
            success,
            execution_id,
            error,
        }
    }

    pub async fn status(&self) -> WatcherStatus {
        let state = self.state.read().await;
        WatcherStatus {
            is_active: state.active,
            watcher_count: state.entries.len(),
            patterns: state.entries.iter().map(|e| e.pattern.to_string()).collect(),
            watchers: state
                .entries
                .iter()
                .map(|e| WatcherInfo {
                    pattern: e.pattern.to_string(),
                    flow_id: e.flow_id,
                    flow_name: e.flow_name.clone(),
                    watch_dir: e.watch_dir.clone(),
                    last_trigger: e.last_trigger.clone(),
                })
                .collect(),
            watched_dirs: {
                let mut dirs: Vec<PathBuf> = state.dirs.keys().cloned().collect();
                dirs.sort();
                dirs
            },
        }
    }

    fn acquire_dir(&self, state: &mut WatcherState, dir: &Path) -> Result<(), WatcherError> {
        let Some(tx) = &self.os_events else {
            return Ok(());
        };

        if let Some(watch) = state.dirs.get_mut(dir) {
            watch.users += 1;
            return Ok(());
        }

        let handle = watch_directory(dir, tx.clone())?;
        tracing::debug!("Opened OS watch on {}", dir.display());
        state.dirs.insert(
            dir.to_path_buf(),
            DirWatch {
                _handle: Mutex::new(handle),
                users: 1,
            },
        );
        Ok(())
    }
}

fn release_dir(state: &mut WatcherState, dir: &Path) {
    let Some(watch) = state.dirs.get_mut(dir) else {
        return;
    };
    watch.users -= 1;
    if watch.users == 0 {
        state.dirs.remove(dir);
        tracing::debug!("Closed OS watch on {}", dir.display());
    }
}

/// Feed OS changes to the watcher. A change is held until no event for the
/// same file has arrived for `window`, so a burst (create then modify) runs
/// the matching flows once.
async fn dispatch_os_events(
    watcher: Weak<FileWatcher>,
    mut rx: mpsc::UnboundedReceiver<OsChange>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(change)) => {
                    if !batch.contains(&change) {
                        batch.push(change);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        let Some(watcher) = watcher.upgrade() else {
            break;
        };
        tracing::debug!("Dispatching {} coalesced file changes", batch.len());
        for change in &batch {
            watcher.handle_os_change(change).await;
        }
    }
    tracing::debug!("File event dispatcher stopped");
}

/// Start a recursive OS watch on `dir`, forwarding changed paths relative to
/// it.
fn watch_directory(
    dir: &Path,
    tx: mpsc::UnboundedSender<OsChange>,
) -> Result<RecommendedWatcher, WatcherError> {
    let watch_error = |e: notify::Error| WatcherError::Watch {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };
    let key = dir.to_path_buf();
    let base = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                for path in event.paths {
                    let relative = path
                        .strip_prefix(&key)
                        .or_else(|_| path.strip_prefix(&base))
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| path.clone());
                    let _ = tx.send(OsChange {
                        dir: key.clone(),
                        path: relative,
                    });
                }
            }
            Err(e) => tracing::warn!("File watch error: {}", e),
        }
    })
    .map_err(watch_error)?;

    watcher
        .watch(dir, RecursiveMode::Recursive)
        .map_err(watch_error)?;
    Ok(watcher)
}
