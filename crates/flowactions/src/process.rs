use flowruntime::{ActionContext, ActionError, ActionOutcome};
use serde_json::json;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Shell command run through `sh -c`.
pub(crate) async fn run_command(
    command: &str,
    working_dir: Option<&Path>,
    timeout_ms: u64,
    ctx: &ActionContext,
) -> Result<ActionOutcome, ActionError> {
    let command = substitute(command, ctx);
    tracing::debug!("Running command: {}", command);

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&command);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    run(cmd, timeout_ms, ctx).await
}

/// Executable script invoked directly with its arguments.
pub(crate) async fn run_script(
    script: &Path,
    args: &[String],
    timeout_ms: u64,
    ctx: &ActionContext,
) -> Result<ActionOutcome, ActionError> {
    let args: Vec<String> = args.iter().map(|arg| substitute(arg, ctx)).collect();
    tracing::debug!("Running script: {} {:?}", script.display(), args);

    let mut cmd = Command::new(script);
    cmd.args(&args);

    run(cmd, timeout_ms, ctx).await
}

/// Replace `{{flow_id}}`, `{{execution_id}}`, `{{file_path}}` and
/// `{{file_name}}` with values from the execution. Placeholders without a
/// value (file variables of a manual run) are left as written.
fn substitute(template: &str, ctx: &ActionContext) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    let file_path = ctx
        .trigger
        .file_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let variables = [
        ("flow_id", Some(ctx.flow_id.to_string())),
        ("execution_id", Some(ctx.execution_id.clone())),
        ("file_path", file_path),
        ("file_name", ctx.trigger.file_name().map(str::to_string)),
    ];

    let mut text = template.to_string();
    for (name, value) in variables {
        if let Some(value) = value {
            text = text.replace(&format!("{{{{{}}}}}", name), &value);
        }
    }
    text
}

async fn run(
    mut cmd: Command,
    timeout_ms: u64,
    ctx: &ActionContext,
) -> Result<ActionOutcome, ActionError> {
    cmd.env("FLOW_ID", ctx.flow_id.to_string())
        .env("FLOW_EXECUTION_ID", &ctx.execution_id)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = &ctx.trigger.file_path {
        cmd.env("FLOW_FILE_PATH", path);
    }

    let child = cmd
        .spawn()
        .map_err(|e| ActionError::Failed(format!("Failed to spawn process: {}", e)))?;

    let output = timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
        .await
        .map_err(|_| ActionError::Timeout { ms: timeout_ms })?
        .map_err(|e| ActionError::Failed(format!("Failed to wait for process: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code();

    if !stderr.is_empty() {
        tracing::debug!("Process stderr: {}", stderr.trim_end());
    }

    let result = json!({
        "stdout": stdout,
        "stderr": stderr,
        "exit_code": exit_code,
    });

    if output.status.success() {
        return Ok(ActionOutcome::succeeded(result));
    }

    let reason = match exit_code {
        Some(code) => format!("Process exited with status {}", code),
        None => "Process terminated by signal".to_string(),
    };
    let message = match stderr.trim() {
        "" => reason,
        detail => format!("{}: {}", reason, detail),
    };

    Ok(ActionOutcome {
        output: Some(result),
        ..ActionOutcome::failed(message)
    })
}
