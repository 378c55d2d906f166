//! Standard action executor
//!
//! Runs the built-in action kinds of a flow: shell commands, scripts, HTTP
//! requests and delays.

mod http;
mod process;
mod time;

use async_trait::async_trait;
use flowruntime::{Action, ActionContext, ActionError, ActionExecutor, ActionOutcome};

/// Executor for every built-in `Action` kind
pub struct StandardExecutor {
    client: reqwest::Client,
}

impl StandardExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for StandardExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for StandardExecutor {
    async fn execute_action(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, ActionError> {
        tracing::info!(
            "Executing {} action {} of execution {}",
            action.kind(),
            ctx.action_index + 1,
            ctx.execution_id
        );

        match action {
            Action::Command {
                command,
                working_dir,
                timeout_ms,
            } => process::run_command(command, working_dir.as_deref(), *timeout_ms, ctx).await,
            Action::Script {
                script,
                args,
                timeout_ms,
            } => process::run_script(script, args, *timeout_ms, ctx).await,
            Action::Http {
                url,
                method,
                headers,
                body,
                timeout_ms,
            } => http::send(&self.client, *method, url, headers, body.as_ref(), *timeout_ms).await,
            Action::Delay { duration_ms } => Ok(time::delay(*duration_ms).await),
        }
    }
}
