use std::env;
use std::sync::{Mutex, OnceLock};

use orgflow_cli::commands::tree::TreeOptions;
use orgflow_cli::commands::{migrate, process_triggers, seed, tree};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ORGFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_port() {
    with_env(&[("ORGFLOW_SERVER_PORT", "not-a-port")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("ORGFLOW_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["data"]["employees"], 8);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn tree_renders_seeded_organisation() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("ORGFLOW_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = tree::run(TreeOptions::default());
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["stats"]["roots"], 1);
        assert_eq!(payload["data"]["stats"]["total_employees"], 7);
        let lines = payload["data"]["lines"].as_array().expect("lines");
        assert_eq!(lines[0], "- Helena Prado (emp-ceo) [2 reports]");
        assert!(!lines.iter().any(|line| line.as_str().unwrap_or_default().contains("emp-gone")));

        let with_inactive =
            tree::run(TreeOptions { include_inactive: true, ..TreeOptions::default() });
        let payload = parse_payload(&with_inactive.output);
        assert_eq!(payload["data"]["stats"]["total_employees"], 8);
    });
}

#[test]
fn process_triggers_reports_an_empty_pass() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&[("ORGFLOW_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = process_triggers::run();
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "process-triggers");
        assert_eq!(payload["data"]["report"]["processed"], 0);
        assert_eq!(payload["data"]["notifications"].as_array().map(Vec::len), Some(0));
    });
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("orgflow.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "ORGFLOW_DATABASE_URL",
        "ORGFLOW_DATABASE_MAX_CONNECTIONS",
        "ORGFLOW_DATABASE_TIMEOUT_SECS",
        "ORGFLOW_SERVER_BIND_ADDRESS",
        "ORGFLOW_SERVER_PORT",
        "ORGFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ORGFLOW_LOGGING_LEVEL",
        "ORGFLOW_LOGGING_FORMAT",
        "ORGFLOW_LOG_LEVEL",
        "ORGFLOW_LOG_FORMAT",
        "ORGFLOW_HIERARCHY_MAX_DEPTH",
        "ORGFLOW_WORKFLOW_LEVELS",
        "ORGFLOW_WORKFLOW_MIN_COMMENT_CHARS",
        "ORGFLOW_NPS_AUTO_TRIGGER_ENABLED",
        "ORGFLOW_NPS_DEFAULT_DELAY_MINUTES",
        "ORGFLOW_NPS_DETRACTOR_ALERT_ENABLED",
        "ORGFLOW_NPS_DETRACTOR_THRESHOLD",
        "ORGFLOW_NPS_SURVEY_EXPIRATION_DAYS",
        "ORGFLOW_NPS_POLL_INTERVAL_SECS",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
