//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test
//! gets its own HOME so the database and config never leak between them.

use std::path::Path;
use std::process::Command;

/// Run a CLI command against an isolated home directory.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "waypoint-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env("WAYPOINT_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_region_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        home.path(),
        &[
            "region",
            "add",
            "--task-id",
            "errand",
            "--lat",
            "35.68",
            "--lon",
            "139.76",
            "--region-type",
            "arrival",
        ],
    );
    assert_eq!(code, 0, "region add failed: {stderr}");
    assert!(stdout.contains("region_id"));

    let (stdout, _, code) = run_cli(home.path(), &["region", "list"]);
    assert_eq!(code, 0);
    let regions: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(regions.as_array().unwrap().len(), 1);
    assert_eq!(regions[0]["task_id"], "errand");
}

#[test]
fn test_region_add_rejects_bad_coordinates() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &[
            "region",
            "add",
            "--task-id",
            "errand",
            "--lat",
            "95.0",
            "--lon",
            "0.0",
            "--region-type",
            "arrival",
        ],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("latitude"));
}

#[test]
fn test_tier_evaluate_low_battery() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["tier", "evaluate", "--battery", "0.15"],
    );
    assert_eq!(code, 0, "tier evaluate failed: {stderr}");
    assert!(stdout.contains("TierChanged"));

    let (stdout, _, code) = run_cli(home.path(), &["tier", "status"]);
    assert_eq!(code, 0);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["tier"], "power-save");
}

#[test]
fn test_config_roundtrip() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "retry.max_retries", "5"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "retry.max_retries"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");

    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("max_retries"));
}

#[test]
fn test_mute_blocks_send_until_cancelled() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["notify", "mute", "--task-id", "errand", "1h"],
    );
    assert_eq!(code, 0);

    // A second mute on the same task is refused.
    let (_, stderr, code) = run_cli(
        home.path(),
        &["notify", "mute", "--task-id", "errand", "4h"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("already muted"));

    let (stdout, _, code) = run_cli(
        home.path(),
        &[
            "notify",
            "send",
            "--notification-id",
            "n1",
            "--task-id",
            "errand",
            "--title",
            "Reminder",
            "--body",
            "Pick up milk",
        ],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("suppressed"));

    let (_, _, code) = run_cli(home.path(), &["notify", "cancel-mute", "--task-id", "errand"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(
        home.path(),
        &[
            "notify",
            "send",
            "--notification-id",
            "n1",
            "--task-id",
            "errand",
            "--title",
            "Reminder",
            "--body",
            "Pick up milk",
        ],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("[push n1]"));
}

#[test]
fn test_diagnostics_show() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(home.path(), &["diagnostics", "show"]);
    assert_eq!(code, 0, "diagnostics failed: {stderr}");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["tier"], "balanced");
    assert_eq!(report["active_regions"], 0);
}

#[test]
fn test_sweep_run_is_quiet_when_nothing_due() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["sweep", "run"]);
    assert_eq!(code, 0);
    let events: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(events.as_array().unwrap().is_empty());
}
