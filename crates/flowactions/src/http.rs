use flowruntime::{ActionError, ActionOutcome, HttpMethod};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Send one HTTP request. Any 2xx response counts as success.
pub(crate) async fn send(
    client: &reqwest::Client,
    method: HttpMethod,
    url: &str,
    headers: &BTreeMap<String, String>,
    body: Option<&serde_json::Value>,
    timeout_ms: u64,
) -> Result<ActionOutcome, ActionError> {
    tracing::debug!("{} {}", method.as_str(), url);

    let mut request = match method {
        HttpMethod::Get => client.get(url),
        HttpMethod::Post => client.post(url),
        HttpMethod::Put => client.put(url),
        HttpMethod::Patch => client.patch(url),
        HttpMethod::Delete => client.delete(url),
    };

    for (key, value) in headers {
        request = request.header(key, value);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ActionError::Timeout { ms: timeout_ms }
            } else {
                ActionError::Failed(format!("HTTP request failed: {}", e))
            }
        })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ActionError::Failed(format!("Failed to read response: {}", e)))?;

    tracing::debug!("Response status: {}", status.as_u16());

    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    let output = json!({
        "status": status.as_u16(),
        "body": body,
    });

    if status.is_success() {
        Ok(ActionOutcome::succeeded(output))
    } else {
        Ok(ActionOutcome {
            output: Some(output),
            ..ActionOutcome::failed(format!("HTTP request returned {}", status))
        })
    }
}
