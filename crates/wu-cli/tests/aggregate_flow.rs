//! End-to-end tests for the aggregation flow through the `wu` binary.
//!
//! Tests the full pipeline: add agents → log wrap-ups → aggregate → stats

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn wu_binary() -> String {
    env!("CARGO_BIN_EXE_wu").to_string()
}

/// Runs `wu` against a database inside `temp`, isolated from the user's config.
fn wu(temp: &Path, args: &[&str]) -> Output {
    Command::new(wu_binary())
        .env("HOME", temp)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env_remove("RUST_LOG")
        .env("WU_DATABASE_PATH", temp.join("wu.db"))
        .args(args)
        .output()
        .expect("failed to run wu")
}

fn wu_ok(temp: &Path, args: &[&str]) -> String {
    let output = wu(temp, args);
    assert!(
        output.status.success(),
        "wu {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 output")
}

fn log_wrapup(temp: &Path, agent: &str, at: &str, duration: &str) {
    wu_ok(
        temp,
        &[
            "log",
            "wrapup",
            "--agent",
            agent,
            "--at",
            at,
            "--duration",
            duration,
        ],
    );
}

fn seed(temp: &Path) {
    wu_ok(temp, &["agents", "add", "--number", "42"]);
    log_wrapup(temp, "Agent/42", "2012-07-03T08:01:40Z", "50");
    log_wrapup(temp, "Agent/42", "2012-07-03T08:29:50Z", "20");
    log_wrapup(temp, "Agent/77", "2012-07-03T08:10:00Z", "30");
}

fn aggregate_json(temp: &Path, extra: &[&str]) -> serde_json::Value {
    let mut args = vec![
        "aggregate",
        "--start",
        "2012-07-03T08:00:00Z",
        "--end",
        "2012-07-03T09:00:00Z",
        "--window",
        "30m",
        "--json",
    ];
    args.extend_from_slice(extra);
    serde_json::from_str(&wu_ok(temp, &args)).expect("valid JSON output")
}

/// Wrap-ups are split at the window boundary and unknown agents are skipped.
#[test]
fn test_aggregate_splits_and_skips() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let report = aggregate_json(temp.path(), &[]);
    let totals = report["totals"].as_array().unwrap();

    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0]["window_boundary"], "2012-07-03T08:00:00Z");
    assert_eq!(totals[0]["agent_id"], 1);
    assert_eq!(totals[0]["wrapup_seconds"], 60);
    assert_eq!(totals[1]["window_boundary"], "2012-07-03T08:30:00Z");
    assert_eq!(totals[1]["wrapup_seconds"], 10);
    assert_eq!(report["skipped"]["unknown_agent"], 1);
    assert!(report["stored"].is_null());
}

/// Running the same aggregation twice yields identical output.
#[test]
fn test_aggregate_is_idempotent() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let first = aggregate_json(temp.path(), &[]);
    let second = aggregate_json(temp.path(), &[]);
    assert_eq!(first, second);
}

/// `--strict` turns an unknown agent into a failure.
#[test]
fn test_aggregate_strict_fails_on_unknown_agent() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let output = wu(
        temp.path(),
        &[
            "aggregate",
            "--start",
            "2012-07-03T08:00:00Z",
            "--end",
            "2012-07-03T09:00:00Z",
            "--strict",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown agent: Agent/77"),
        "unexpected stderr: {stderr}"
    );
}

/// A zero-length window is rejected before anything is read.
#[test]
fn test_aggregate_rejects_zero_window() {
    let temp = TempDir::new().unwrap();

    let output = wu(
        temp.path(),
        &[
            "aggregate",
            "--start",
            "2012-07-03T08:00:00Z",
            "--end",
            "2012-07-03T09:00:00Z",
            "--window",
            "0",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid --window"));
}

/// Persisted results are replaced, not accumulated, on re-run.
#[test]
fn test_persist_then_stats() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let first = aggregate_json(temp.path(), &["--persist"]);
    assert_eq!(first["stored"], 2);
    let second = aggregate_json(temp.path(), &["--persist"]);
    assert_eq!(second["stored"], 2);

    let stats = wu_ok(
        temp.path(),
        &[
            "stats",
            "--start",
            "2012-07-03T08:00:00Z",
            "--end",
            "2012-07-03T09:00:00Z",
            "--json",
        ],
    );
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    let rows = stats.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["wrapup_seconds"], 60);
    assert_eq!(rows[1]["wrapup_seconds"], 10);

    let pruned = wu_ok(temp.path(), &["prune", "--after", "2012-07-03T08:00:00Z"]);
    assert!(pruned.contains("Removed 1 periodic rows"), "{pruned}");
    let stats = wu_ok(
        temp.path(),
        &[
            "stats",
            "--start",
            "2012-07-03T08:00:00Z",
            "--end",
            "2012-07-03T09:00:00Z",
            "--json",
        ],
    );
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats.as_array().unwrap().len(), 1);
}
