use flowruntime::ActionOutcome;
use serde_json::json;
use tokio::time::{sleep, Duration};

/// Pause the flow for `duration_ms`.
pub(crate) async fn delay(duration_ms: u64) -> ActionOutcome {
    tracing::debug!("Delaying for {}ms", duration_ms);

    sleep(Duration::from_millis(duration_ms)).await;

    ActionOutcome::succeeded(json!({ "delayed_ms": duration_ms }))
}
