//! Integration tests for core CLI contract behavior.

use predicates::prelude::*;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("axdl")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("axdl"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("axdl"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("axdl"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn missing_axp_fails_fast_with_a_clear_stderr_message() {
    let mut cmd = cli_cmd();
    cmd.assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--axp"));
}

#[test]
fn list_devices_json_emits_a_parseable_array_on_stdout_only() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-devices", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid json expected");
    assert!(parsed.is_array(), "list-devices --json should return an array");
}

#[test]
fn list_devices_accepts_a_vid_pid_filter_without_opening_any_device() {
    let mut cmd = cli_cmd();
    cmd.args(["--vid", "ffff", "--pid", "ffff", "list-devices"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_for_bash_exit_zero_and_write_a_nonempty_script() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("axdl"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn nonexistent_bundle_path_fails_with_a_clear_error() {
    let mut cmd = cli_cmd();
    cmd.args(["--axp", "/tmp/axdl-contract-test-does-not-exist.axp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
