// crates/flowruntime/tests/watcher_test.rs

mod common;

use common::{commands, failing_manager, manager_with, ScriptedExecutor};
use flowruntime::{
    ExecutionEvent, FileWatcher, FlowDefinition, FlowId, FlowManager, Trigger, WatcherError,
};
use std::path::PathBuf;

async fn define_watched(
    manager: &FlowManager,
    name: &str,
    pattern: &str,
    actions: &[&str],
) -> FlowId {
    manager
        .define_flow(name, "", Trigger::file_change(pattern, "."), commands(actions))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_start_registers_enabled_file_flows() {
    let manager = manager_with(ScriptedExecutor::new());
    define_watched(&manager, "Text", "*.txt", &["ok"]).await;
    manager
        .define_flow("Manual", "", Trigger::Manual, commands(&["ok"]))
        .await
        .unwrap();
    manager
        .define(
            FlowDefinition::new("Off", "", Trigger::file_change("*.csv", "."), vec![])
                .with_enabled(false),
        )
        .await
        .unwrap();

    let watcher = FileWatcher::new(manager.clone());
    let count = watcher.start_watching().await.unwrap();

    let status = watcher.status().await;
    assert_eq!(count, 1);
    assert!(status.is_active);
    assert_eq!(status.watcher_count, 1);
    assert_eq!(status.patterns, vec!["*.txt"]);
    assert_eq!(status.watchers[0].flow_name, "Text");
    assert_eq!(status.watchers[0].watch_dir, PathBuf::from("."));
}

#[tokio::test]
async fn test_patterns_route_to_matching_flows() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    let text = define_watched(&manager, "Text", "*.txt", &["on-text"]).await;
    let config = define_watched(&manager, "Config", "config.*", &["on-config"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();

    let records = watcher.simulate_file_change("config.json").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow_id, config);
    assert_eq!(executor.labels(), vec!["on-config"]);

    let records = watcher.simulate_file_change("readme.txt").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flow_id, text);
    assert_eq!(executor.labels(), vec!["on-config", "on-text"]);

    let records = watcher.simulate_file_change("image.png").await;
    assert!(records.is_empty());
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_one_change_fans_out_to_every_match() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    let failing = define_watched(&manager, "Failing", "*.txt", &["fail"]).await;
    let healthy = define_watched(&manager, "Healthy", "report", &["archive"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();

    let records = watcher.simulate_file_change("daily-report.txt").await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].flow_id, failing);
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("command exited with 1"));
    assert!(records[0].execution_id.is_some());
    assert_eq!(records[1].flow_id, healthy);
    assert!(records[1].success);
    assert_eq!(executor.calls_for(failing), 1);
    assert_eq!(executor.calls_for(healthy), 1);
    assert_eq!(manager.stats().await.total, 2);
}

#[tokio::test]
async fn test_panicking_flow_does_not_stop_others() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    define_watched(&manager, "Explodes", "*.log", &["panic"]).await;
    let steady = define_watched(&manager, "Steady", "app", &["rotate"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();

    let records = watcher.simulate_file_change("app.log").await;

    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert!(records[0]
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Flow trigger failed")));
    assert!(records[1].success);
    assert_eq!(records[1].flow_id, steady);
    assert!(watcher.is_active().await);
}

#[tokio::test]
async fn test_panicked_flow_is_released_and_counted() {
    let manager = manager_with(ScriptedExecutor::new());
    let explodes = define_watched(&manager, "Explodes", "*.log", &["panic"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();
    watcher.simulate_file_change("app.log").await;

    let stats = manager.stats().await;
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(manager.active_executions(explodes).await, 0);

    manager.delete_flow(explodes).await.unwrap();
}

#[tokio::test]
async fn test_inactive_watcher_drops_changes() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    define_watched(&manager, "Any", "*", &["ok"]).await;

    let watcher = FileWatcher::new(manager.clone());
    assert!(watcher.simulate_file_change("test.txt").await.is_empty());

    watcher.start_watching().await.unwrap();
    watcher.stop_watching().await;

    assert!(watcher.simulate_file_change("test.txt").await.is_empty());
    assert!(executor.calls().is_empty());
    assert_eq!(manager.stats().await.total, 0);

    let status = watcher.status().await;
    assert!(!status.is_active);
    assert_eq!(status.watcher_count, 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let manager = manager_with(ScriptedExecutor::new());
    let watcher = FileWatcher::new(manager);

    watcher.stop_watching().await;
    watcher.stop_watching().await;

    assert_eq!(watcher.status().await.watcher_count, 0);
}

#[tokio::test]
async fn test_trigger_context_carries_file_path() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    define_watched(&manager, "Docs", "*.md", &["render"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();
    watcher.simulate_file_change("docs/intro.md").await;

    assert_eq!(
        executor.calls()[0].file_path,
        Some(PathBuf::from("docs/intro.md"))
    );
}

#[tokio::test]
async fn test_last_trigger_recorded_on_entry() {
    let manager = manager_with(ScriptedExecutor::new());
    define_watched(&manager, "Text", "*.txt", &["ok"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();
    assert!(watcher.status().await.watchers[0].last_trigger.is_none());

    let records = watcher.simulate_file_change("a.txt").await;

    let status = watcher.status().await;
    let last = status.watchers[0].last_trigger.as_ref().unwrap();
    assert_eq!(last, &records[0]);
    assert_eq!(last.file_path, PathBuf::from("a.txt"));
    assert!(last.success);
    assert!(last.error.is_none());
}

#[tokio::test]
async fn test_missing_flow_recorded_as_failure() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    let id = define_watched(&manager, "Gone", "*.txt", &["ok"]).await;
    let kept = define_watched(&manager, "Kept", "notes", &["ok"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();
    manager.delete_flow(id).await.unwrap();

    let records = watcher.simulate_file_change("notes.txt").await;

    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert!(records[0].execution_id.is_none());
    assert!(records[0].error.as_deref().unwrap().contains("not found"));
    assert!(records[1].success);
    assert_eq!(executor.calls_for(kept), 1);
}

#[tokio::test]
async fn test_add_watcher_skips_manual_and_disabled() {
    let manager = manager_with(ScriptedExecutor::new());
    let watcher = FileWatcher::new(manager);

    let manual = FlowDefinition::new("Manual", "", Trigger::Manual, vec![]);
    let disabled =
        FlowDefinition::new("Off", "", Trigger::file_change("*.txt", "."), vec![]).with_enabled(false);
    let watched = FlowDefinition::new("On", "", Trigger::file_change("*.txt", "."), vec![]);

    assert!(!watcher.add_watcher(&manual).await.unwrap());
    assert!(!watcher.add_watcher(&disabled).await.unwrap());
    assert!(watcher.add_watcher(&watched).await.unwrap());
    assert_eq!(watcher.status().await.watcher_count, 1);
}

#[tokio::test]
async fn test_duplicate_pattern_replaces_entry() {
    let manager = manager_with(ScriptedExecutor::new());
    let watcher = FileWatcher::new(manager);

    let first = FlowDefinition::new("First", "", Trigger::file_change("*.txt", "."), vec![]);
    let other = FlowDefinition::new("Other", "", Trigger::file_change("*.md", "."), vec![]);
    let second = FlowDefinition::new("Second", "", Trigger::file_change("*.txt", "."), vec![]);

    watcher.add_watcher(&first).await.unwrap();
    watcher.add_watcher(&other).await.unwrap();
    watcher.add_watcher(&second).await.unwrap();

    let status = watcher.status().await;
    assert_eq!(status.patterns, vec!["*.txt", "*.md"]);
    assert_eq!(status.watchers[0].flow_id, second.id);
}

#[tokio::test]
async fn test_remove_watcher() {
    let executor = ScriptedExecutor::new();
    let manager = manager_with(executor.clone());
    define_watched(&manager, "Text", "*.txt", &["ok"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();

    assert!(watcher.remove_watcher("*.txt").await);
    assert!(!watcher.remove_watcher("*.txt").await);
    assert!(watcher.simulate_file_change("a.txt").await.is_empty());
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_refresh_picks_up_flow_changes() {
    let manager = manager_with(ScriptedExecutor::new());
    let text = define_watched(&manager, "Text", "*.txt", &["ok"]).await;

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();

    define_watched(&manager, "Logs", "*.log", &["ok"]).await;
    manager.disable_flow(text).await.unwrap();
    assert_eq!(watcher.status().await.patterns, vec!["*.txt"]);

    let count = watcher.refresh_watchers().await.unwrap();

    let status = watcher.status().await;
    assert_eq!(count, 1);
    assert!(status.is_active);
    assert_eq!(status.patterns, vec!["*.log"]);
}

#[tokio::test]
async fn test_watcher_events() {
    let manager = manager_with(ScriptedExecutor::new());
    let id = define_watched(&manager, "Text", "*.txt", &["ok"]).await;
    let mut events = manager.subscribe_events();

    let watcher = FileWatcher::new(manager.clone());
    watcher.start_watching().await.unwrap();
    watcher.simulate_file_change("a.txt").await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(ExecutionEvent::FileChanged { .. })
    ));
    assert!(matches!(
        received.last(),
        Some(ExecutionEvent::FlowTriggered { flow_id, success: true, .. }) if *flow_id == id
    ));
}

#[tokio::test]
async fn test_start_fails_when_flows_cannot_be_queried() {
    let watcher = FileWatcher::new(failing_manager(ScriptedExecutor::new()));

    let result = watcher.start_watching().await;

    assert!(matches!(result, Err(WatcherError::Query(_))));
    assert!(!watcher.is_active().await);
}
