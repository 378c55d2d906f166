// crates/flowruntime/tests/config_test.rs

use flowruntime::{ConfigError, RuntimeConfig};
use std::time::Duration;
use uuid::Uuid;

#[test]
fn test_partial_config_keeps_defaults() {
    let path = std::env::temp_dir().join(format!("flowruntime-config-{}.json", Uuid::new_v4()));
    std::fs::write(&path, r#"{ "debounce_ms": 250, "history_limit": 5 }"#).unwrap();

    let config = RuntimeConfig::from_file(&path).unwrap();

    assert_eq!(config.debounce(), Duration::from_millis(250));
    assert_eq!(config.history_limit, 5);
    assert_eq!(config.event_buffer_size, RuntimeConfig::default().event_buffer_size);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_config_errors() {
    let missing = RuntimeConfig::from_file("/nonexistent/flow-config.json");
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let path = std::env::temp_dir().join(format!("flowruntime-config-{}.json", Uuid::new_v4()));
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(RuntimeConfig::from_file(&path), Err(ConfigError::Parse(_))));
    let _ = std::fs::remove_file(&path);
}
