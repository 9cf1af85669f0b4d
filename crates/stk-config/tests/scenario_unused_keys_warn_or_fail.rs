use stk_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under consumed prefixes are not flagged.

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
database:
  url_env: "STK_DATABASE_URL"
  max_connection: 4

unused_section:
  foo: 123
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/database/max_connection".to_string(),
            "/unused_section/foo".to_string()
        ],
        "typo'd key and unknown section are both reported, sorted"
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
orders:
  transition_policy: strict
  retries: 3
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "got: {msg}");
    assert!(msg.contains("/orders/retries"), "got: {msg}");
}

#[test]
fn fully_consumed_config_is_clean() {
    let yaml = r#"
database:
  url_env: "STK_DATABASE_URL"
  max_connections: 10
  acquire_timeout_secs: 5
orders:
  transition_policy: permissive
pagination:
  default_limit: 50
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
