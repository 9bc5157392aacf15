//! Basic CLI E2E tests.
//!
//! Each test points BREATHFLOW_DATA_DIR at its own temp directory and
//! invokes the built binary.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_breathflow-cli"))
        .args(args)
        .env("BREATHFLOW_DATA_DIR", data_dir)
        .env_remove("BREATHFLOW_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).expect("event line is JSON"))
        .collect()
}

#[test]
fn test_patterns_list() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["patterns", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("box"));
    assert!(stdout.contains("4-7-8"));
}

#[test]
fn test_patterns_show_unknown_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["patterns", "show", "nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown pattern"));
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "sync.batch_size", "5"]);
    assert_eq!(code, 0);
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "sync.batch_size"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_clears_endpoint_after_setting_it() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(
        dir.path(),
        &["config", "set", "sync.endpoint", "https://api.example.com"],
    );
    assert_eq!(code, 0);
    let (stdout, stderr, code) = run_cli(dir.path(), &["config", "set", "sync.endpoint", ""]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("cleared"));
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "sync.endpoint"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "(unset)");
}

#[test]
fn test_config_show_masks_api_key() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["config", "set", "sync.api_key", "s3cret"]);
    let (stdout, _, code) = run_cli(dir.path(), &["config", "show"]);
    assert_eq!(code, 0);
    assert!(!stdout.contains("s3cret"));
    assert!(stdout.contains("********"));
}

#[test]
fn test_config_set_rejects_bad_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "set", "sync.endpoint", "not a url"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("sync.endpoint"));
}

#[test]
fn test_simulated_session_is_saved_and_pending() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        dir.path(),
        &["session", "run", "--pattern", "box", "--cycles", "2", "--simulate"],
    );
    assert_eq!(code, 0, "session run failed: {stderr}");

    let events = json_lines(&stdout);
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(kinds.first(), Some(&"Initializing"));
    assert!(kinds.contains(&"Completed"));
    let completed = events.iter().find(|e| e["type"] == "Completed").unwrap();
    assert_eq!(completed["cycle_count"], 2);
    assert_eq!(completed["duration_ms"], 32_000);
    assert!(kinds.contains(&"Saved"));

    let (stdout, _, code) = run_cli(dir.path(), &["history", "--json"]);
    assert_eq!(code, 0);
    let history: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["sync_state"], "pending");
    assert_eq!(history[0]["completed"], true);

    let (stdout, _, code) = run_cli(dir.path(), &["sync", "status"]);
    assert_eq!(code, 0);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["pending_count"], 1);
}

#[test]
fn test_classic_mode_ignores_camera() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        dir.path(),
        &[
            "session", "run", "--cycles", "1", "--simulate", "--camera", "--camera-available",
            "--mode", "classic",
        ],
    );
    assert_eq!(code, 0);
    let events = json_lines(&stdout);
    let ready = events.iter().find(|e| e["type"] == "Ready").unwrap();
    assert_eq!(ready["features"]["camera"], "disabled");
    let metrics = events.iter().find(|e| e["type"] == "Metrics").unwrap();
    assert_eq!(metrics["metrics"]["camera_used"], false);
    assert_eq!(metrics["metrics"]["session_type"], "classic");
}

#[test]
fn test_sync_run_without_endpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["sync", "run"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("sync.endpoint"));
}

#[test]
fn test_history_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["history"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no sessions recorded"));
}
