//! Integration tests for `pushrun config`

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pushrun(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pushrun"));
    cmd.env("NO_COLOR", "1")
        .env("HOME", dir.path())
        .env("PUSHRUN_CONFIG", dir.path().join("config.yaml"));
    cmd
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let dir = TempDir::new().expect("tempdir");
    pushrun(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("connection.default_protocol:"))
        .stdout(predicate::str::contains("ssh"))
        .stdout(predicate::str::contains("15.3.14"));
}

#[test]
fn test_config_set_persists_value() {
    let dir = TempDir::new().expect("tempdir");
    pushrun(&dir)
        .args(["config", "set", "connection.sudo", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set connection.sudo = true"));

    let output = pushrun(&dir)
        .args(["--json", "config", "show"])
        .output()
        .expect("runs");
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["config"]["connection"]["sudo"], true);

    let written = std::fs::read_to_string(dir.path().join("config.yaml")).expect("file written");
    assert!(written.contains("sudo: true"), "got: {written}");
}

#[test]
fn test_config_set_unknown_key_fails() {
    let dir = TempDir::new().expect("tempdir");
    pushrun(&dir)
        .args(["config", "set", "connection.password", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting"));
    assert!(!dir.path().join("config.yaml").exists());
}

#[test]
fn test_config_set_invalid_value_json_error() {
    let dir = TempDir::new().expect("tempdir");
    let output = pushrun(&dir)
        .args(["--json", "config", "set", "connection.default_protocol", "winrm"])
        .output()
        .expect("runs");

    assert!(!output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["error"], true);
    assert!(
        v["message"]
            .as_str()
            .is_some_and(|m| m.contains("Invalid value")),
        "got: {v}"
    );
}
