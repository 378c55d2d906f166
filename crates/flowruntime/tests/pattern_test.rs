// crates/flowruntime/tests/pattern_test.rs

use flowruntime::{FilePattern, WatcherError};

fn matches(pattern: &str, path: &str) -> bool {
    FilePattern::parse(pattern).unwrap().matches(path)
}

#[test]
fn test_star_matches_everything() {
    assert!(matches("*", "anything.bin"));
    assert!(matches("*", "nested/dir/file"));
    assert!(matches("*", ""));
}

#[test]
fn test_wildcard_is_anchored() {
    assert!(matches("*.txt", "readme.txt"));
    assert!(matches("*.txt", "notes/readme.txt"));
    assert!(!matches("*.txt", "readme.txt.bak"));
    assert!(!matches("*.txt", "image.png"));

    assert!(matches("config.*", "config.json"));
    assert!(!matches("config.*", "app/config.json"));
    assert!(!matches("config.*", "readme.txt"));
}

#[test]
fn test_wildcard_escapes_regex_characters() {
    assert!(matches("data[1].*", "data[1].csv"));
    assert!(!matches("*.txt", "readmeXtxt"));
    assert!(matches("a+b*", "a+b.log"));
}

#[test]
fn test_multiple_wildcards() {
    assert!(matches("src/*/mod.*", "src/net/mod.rs"));
    assert!(!matches("src/*/mod.*", "lib/net/mod.rs"));
}

#[test]
fn test_plain_pattern_is_substring() {
    assert!(matches("config", "config"));
    assert!(matches("config", "src/config/app.toml"));
    assert!(matches("config", "myconfig.yaml"));
    assert!(!matches("config", "conf.yaml"));
}

#[test]
fn test_display_keeps_source() {
    let pattern = FilePattern::parse("*.rs").unwrap();
    assert_eq!(pattern.as_str(), "*.rs");
    assert_eq!(pattern.to_string(), "*.rs");
}

#[test]
fn test_nul_byte_is_rejected() {
    let result = FilePattern::parse("*.log\0");
    assert!(matches!(result, Err(WatcherError::InvalidPattern { .. })));
}
