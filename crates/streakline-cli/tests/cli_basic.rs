//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_streakline-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("STREAKLINE_ENV")
        .env_remove("STREAKLINE_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn add_habit(home: &Path, name: &str) -> String {
    let out = run_ok(home, &["habit", "add", name, "--attribute", "wisdom"]);
    let habit: serde_json::Value = serde_json::from_str(&out).unwrap();
    habit["id"].as_str().unwrap().to_string()
}

fn complete_mornings(home: &Path, id: &str, days: std::ops::RangeInclusive<u32>) {
    for d in days {
        let at = format!("2024-01-{d:02}T08:00");
        run_ok(home, &["log", "complete", id, "--at", &at]);
    }
}

#[test]
fn test_habit_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Meditate");

    let out = run_ok(home.path(), &["habit", "list"]);
    let habits: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0]["id"], id.as_str());
    assert_eq!(habits[0]["linked_attribute"], "wisdom");
}

#[test]
fn test_deactivated_habit_hidden_from_list() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Journal");
    run_ok(home.path(), &["habit", "deactivate", &id]);

    let active: Vec<serde_json::Value> =
        serde_json::from_str(&run_ok(home.path(), &["habit", "list"])).unwrap();
    let all: Vec<serde_json::Value> =
        serde_json::from_str(&run_ok(home.path(), &["habit", "list", "--all"])).unwrap();
    assert!(active.is_empty());
    assert_eq!(all.len(), 1);
}

#[test]
fn test_streak_after_five_days() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Stretch");
    complete_mornings(home.path(), &id, 1..=5);

    let out = run_ok(home.path(), &["stats", "streak", &id, "--date", "2024-01-06"]);
    let streak: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(streak["current_length"], 5);
    assert_eq!(streak["longest_length"], 5);
}

#[test]
fn test_completion_awards_xp_once() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Read");
    run_ok(home.path(), &["log", "complete", &id, "--at", "2024-01-02T20:00"]);
    let again = run_ok(home.path(), &["log", "complete", &id, "--at", "2024-01-02T20:05"]);
    let outcome: serde_json::Value = serde_json::from_str(&again).unwrap();
    assert!(outcome["award"].is_null());

    let progress: serde_json::Value =
        serde_json::from_str(&run_ok(home.path(), &["progress", "show"])).unwrap();
    assert_eq!(progress["current_xp"], 10);
    assert_eq!(progress["attributes"]["wisdom"], 2);
}

#[test]
fn test_wake_dispatches_once_per_day() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Walk");
    complete_mornings(home.path(), &id, 1..=5);

    let first = run_ok(home.path(), &["wake", "--at", "2024-01-06T21:00"]);
    let lines: Vec<serde_json::Value> = first
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let kinds: Vec<&str> = lines
        .iter()
        .filter(|l| l["type"] == "nudge")
        .map(|l| l["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["daily_reminder", "streak_danger"]);
    assert_eq!(lines.last().unwrap()["report"]["dispatched"], 2);

    let second = run_ok(home.path(), &["wake", "--at", "2024-01-06T23:30"]);
    assert_eq!(second.lines().count(), 1);
    let report: serde_json::Value = serde_json::from_str(second.trim()).unwrap();
    assert_eq!(report["report"]["suppressed"], 2);
}

fn last_report(stdout: &str) -> serde_json::Value {
    let line = stdout.lines().last().unwrap();
    serde_json::from_str::<serde_json::Value>(line).unwrap()["report"].clone()
}

#[test]
fn test_hung_delivery_command_is_killed_and_retried() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Walk");
    complete_mornings(home.path(), &id, 1..=5);
    run_ok(home.path(), &["config", "set", "wake.delivery_timeout_secs", "1"]);
    run_ok(home.path(), &["config", "set", "wake.delivery_command", "sleep 5"]);

    let first = last_report(&run_ok(home.path(), &["wake", "--at", "2024-01-06T21:00"]));
    assert_eq!(first["delivery_failures"], 2);
    assert_eq!(first["dispatched"], 0);

    run_ok(home.path(), &["config", "set", "wake.delivery_command", "cat >/dev/null"]);
    let second = last_report(&run_ok(home.path(), &["wake", "--at", "2024-01-06T22:00"]));
    assert_eq!(second["dispatched"], 2);
    assert_eq!(second["suppressed"], 0);
}

#[test]
fn test_timed_out_wake_does_not_block_later_wakes() {
    let home = tempfile::tempdir().unwrap();
    let id = add_habit(home.path(), "Stretch");
    complete_mornings(home.path(), &id, 1..=5);
    run_ok(home.path(), &["config", "set", "wake.timeout_secs", "1"]);
    run_ok(home.path(), &["config", "set", "wake.delivery_command", "sleep 3"]);

    let (_, stderr, code) = run_cli(home.path(), &["wake", "--at", "2024-01-06T21:00"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("timed out"));

    // let the abandoned reservation age past the wake timeout
    std::thread::sleep(std::time::Duration::from_secs(2));
    run_ok(home.path(), &["config", "set", "wake.delivery_command", "cat >/dev/null"]);
    let report = last_report(&run_ok(home.path(), &["wake", "--at", "2024-01-06T22:00"]));
    assert_eq!(report["dispatched"], 2);
    assert_eq!(report["suppressed"], 0);
}

#[test]
fn test_out_of_range_config_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    for (key, value) in [
        ("dispatch.retention_days", "4294967295"),
        ("stats.heatmap_weeks", "20000000"),
        ("stats.trend_window_days", "4294967295"),
    ] {
        let (_, stderr, code) = run_cli(home.path(), &["config", "set", key, value]);
        assert_eq!(code, 1, "{key} accepted");
        assert!(stderr.contains(key));
    }
    run_ok(home.path(), &["stats", "heatmap", "--date", "2024-01-06"]);
}

#[test]
fn test_empty_habit_name_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["habit", "add", "  "]);
    assert_eq!(code, 1);
    assert!(stderr.contains("must not be empty"));
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["config", "set", "scheduler.default_hour", "6"]);
    let value = run_ok(home.path(), &["config", "get", "scheduler.default_hour"]);
    assert_eq!(value.trim(), "6");

    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "scheduler.bogus", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_unknown_habit_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["log", "skip", "no-such-habit"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Habit not found"));
}
