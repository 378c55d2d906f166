// crates/flowcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowactions::StandardExecutor;
use flowruntime::{
    Action, ExecutionEvent, ExecutionReport, FileWatcher, FlowDefinition, FlowFilter, FlowId,
    FlowManager, FlowUpdate, HttpMethod, JsonFileStorage, RuntimeConfig, Trigger, TriggerContext,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Quick automation flows", long_about = None)]
struct Cli {
    /// Path to the JSON flow store
    #[arg(short, long, global = true, default_value = "flows.json")]
    store: PathBuf,

    /// Path to a runtime configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Define a new flow from a JSON file
    Define {
        /// Path to flow definition JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List stored flows
    List {
        /// Only enabled flows
        #[arg(long, conflicts_with = "disabled")]
        enabled: bool,

        /// Only disabled flows
        #[arg(long)]
        disabled: bool,
    },

    /// Show one flow
    Show { id: FlowId },

    /// Search flows by name, description or action type
    Search { query: String },

    /// Execute a flow now
    Run {
        id: FlowId,

        /// Pretend the run was caused by a change to this file
        #[arg(long)]
        file_path: Option<PathBuf>,
    },

    /// Apply a partial update from a JSON file
    Update {
        id: FlowId,

        /// Path to update JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Enable a flow
    Enable { id: FlowId },

    /// Disable a flow
    Disable { id: FlowId },

    /// Delete a flow
    Delete { id: FlowId },

    /// Watch files and run matching flows until Ctrl-C
    Watch,

    /// Create an example flow definition
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

/// Flow definition as written by hand; identity and timestamps are assigned
/// when it is defined.
#[derive(Deserialize)]
struct FlowDraft {
    name: String,
    #[serde(default)]
    description: String,
    trigger: Trigger,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    continue_on_error: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    if let Commands::Init { output } = &cli.command {
        return create_example_flow(output);
    }

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let storage = JsonFileStorage::open(&cli.store)
        .await
        .with_context(|| format!("Failed to open flow store {}", cli.store.display()))?;
    tracing::debug!("Using flow store {}", storage.path().display());
    let manager = Arc::new(FlowManager::with_config(
        Arc::new(storage),
        Arc::new(StandardExecutor::new()),
        config,
    ));

    match cli.command {
        Commands::Define { file } => define_flow(&manager, file).await?,
        Commands::List { enabled, disabled } => {
            let filter = match (enabled, disabled) {
                (true, _) => FlowFilter::all().with_enabled(true),
                (_, true) => FlowFilter::all().with_enabled(false),
                _ => FlowFilter::all(),
            };
            list_flows(&manager, &filter).await?;
        }
        Commands::Show { id } => {
            let flow = manager.get_flow(id).await?;
            println!("{}", serde_json::to_string_pretty(&flow)?);
        }
        Commands::Search { query } => search_flows(&manager, &query).await?,
        Commands::Run { id, file_path } => {
            let trigger = match file_path {
                Some(path) => TriggerContext::file_change(path, "*"),
                None => TriggerContext::manual(),
            };
            run_flow(&manager, id, trigger).await?;
        }
        Commands::Update { id, file } => {
            let json = std::fs::read_to_string(&file)?;
            let update: FlowUpdate = serde_json::from_str(&json)?;
            let flow = manager.update_flow(id, update).await?;
            println!("✅ Updated flow '{}' (version {})", flow.name, flow.version);
        }
        Commands::Enable { id } => {
            let flow = manager.enable_flow(id).await?;
            println!("✅ Enabled flow '{}'", flow.name);
        }
        Commands::Disable { id } => {
            let flow = manager.disable_flow(id).await?;
            println!("⏸️  Disabled flow '{}'", flow.name);
        }
        Commands::Delete { id } => {
            manager.delete_flow(id).await?;
            println!("🗑️  Deleted flow {}", id);
        }
        Commands::Watch => watch(manager).await?,
        Commands::Init { .. } => {}
    }

    Ok(())
}

async fn define_flow(manager: &FlowManager, file: PathBuf) -> Result<()> {
    println!("📋 Loading flow from: {}", file.display());

    let json = std::fs::read_to_string(&file)?;
    let draft: FlowDraft = serde_json::from_str(&json)?;

    let flow = FlowDefinition::new(draft.name, draft.description, draft.trigger, draft.actions)
        .with_enabled(draft.enabled)
        .with_continue_on_error(draft.continue_on_error);
    let id = manager.define(flow).await?;

    println!("✨ Defined flow {}", id);
    Ok(())
}

async fn list_flows(manager: &FlowManager, filter: &FlowFilter) -> Result<()> {
    let flows = manager.list_flows(filter).await?;
    if flows.is_empty() {
        println!("No flows defined");
        return Ok(());
    }

    println!("📦 Flows:");
    println!();
    for flow in flows {
        let state = if flow.enabled { "enabled" } else { "disabled" };
        println!("  • {} [{}] ({})", flow.name, flow.trigger.kind(), state);
        println!("    {}", flow.id);
        if !flow.description.is_empty() {
            println!("    {}", flow.description);
        }
    }
    Ok(())
}

async fn search_flows(manager: &FlowManager, query: &str) -> Result<()> {
    let hits = manager.search_flows(query).await?;
    println!("🔍 {} flows match '{}'", hits.len(), query);
    for hit in hits {
        println!("  • {} (relevance {})", hit.flow.name, hit.relevance);
        println!("    {}", hit.flow.id);
    }
    Ok(())
}

async fn run_flow(manager: &FlowManager, id: FlowId, trigger: TriggerContext) -> Result<()> {
    let events = manager.subscribe_events();
    let event_task = tokio::spawn(print_events(events));

    let report = manager.execute_flow(id, trigger).await?;

    // Let the printer drain before the summary
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    print_summary(&report);
    Ok(())
}

async fn watch(manager: Arc<FlowManager>) -> Result<()> {
    let (watcher, dispatcher) = FileWatcher::with_os_events(manager.clone());
    let event_task = tokio::spawn(print_events(manager.subscribe_events()));

    let count = watcher.start_watching().await?;
    let status = watcher.status().await;
    println!(
        "👀 Watching {} patterns in {} directories (Ctrl-C to stop)",
        count,
        status.watched_dirs.len()
    );
    for info in status.watchers {
        println!(
            "  • \"{}\" in {} → {}",
            info.pattern,
            info.watch_dir.display(),
            info.flow_name
        );
    }

    tokio::signal::ctrl_c().await?;
    println!();
    tracing::info!("Shutting down file watcher");

    watcher.stop_watching().await;
    drop(watcher);
    dispatcher.abort();
    event_task.abort();

    let stats = manager.stats().await;
    println!("📊 Session Summary:");
    println!("   Executions: {}", stats.total);
    println!("   Completed: {}", stats.completed);
    println!("   Failed: {}", stats.failed);
    for report in manager.history(None, 10).await {
        let mark = if report.completed { "✅" } else { "❌" };
        println!(
            "   {} {} {} ({}ms)",
            mark, report.execution_id, report.flow_name, report.duration_ms
        );
    }

    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ExecutionEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                println!("  ⚠️  {} events skipped", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ExecutionEvent::FlowStarted { flow_name, .. } => {
                println!("▶️  Flow '{}' started", flow_name);
            }
            ExecutionEvent::ActionStarted { action_index, kind, .. } => {
                println!("  ⚡ Action {} ({})", action_index + 1, kind);
            }
            ExecutionEvent::ActionCompleted { action_index, duration_ms, .. } => {
                println!("  ✅ Action {} completed in {}ms", action_index + 1, duration_ms);
            }
            ExecutionEvent::ActionFailed { action_index, error, .. } => {
                println!("  ❌ Action {} failed: {}", action_index + 1, error);
            }
            ExecutionEvent::FlowCompleted { completed, duration_ms, .. } => {
                if completed {
                    println!("✨ Flow completed successfully in {}ms", duration_ms);
                } else {
                    println!("💥 Flow failed after {}ms", duration_ms);
                }
            }
            ExecutionEvent::FileChanged { path, .. } => {
                println!("📄 {} changed", path.display());
            }
            ExecutionEvent::FlowTriggered { pattern, success, .. } => {
                if !success {
                    println!("  ⚠️  Flow for \"{}\" did not complete", pattern);
                }
            }
        }
    }
}

fn print_summary(report: &ExecutionReport) {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Flow: {}", report.flow_name);
    println!(
        "   Actions: {}/{} succeeded",
        report.results.iter().filter(|r| r.success).count(),
        report.results.len()
    );
    println!("   Duration: {}ms", report.duration_ms);
    if let Some(error) = &report.error {
        println!("   Error: {}", error);
    }

    let outputs: Vec<_> = report
        .results
        .iter()
        .filter_map(|r| r.output.as_ref().map(|o| (r.action_index, o)))
        .collect();
    if !outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (index, output) in outputs {
            println!("   Action {}: {}", index + 1, output);
        }
    }
}

fn create_example_flow(output: &Path) -> Result<()> {
    let example = serde_json::json!({
        "name": "Rebuild docs",
        "description": "Regenerates the docs whenever a markdown file changes",
        "trigger": Trigger::file_change("*.md", "./docs"),
        "actions": [
            Action::command("echo \"changed: {{file_path}}\""),
            Action::delay(500),
            Action::http(HttpMethod::Get, "https://api.github.com/zen"),
        ],
        "continue_on_error": false,
    });

    let json = serde_json::to_string_pretty(&example)?;
    std::fs::write(output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Define it with:");
    println!("  flow define --file {}", output.display());

    Ok(())
}
