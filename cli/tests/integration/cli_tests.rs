//! Integration tests for the CLI surface: help, version and run failures
//! that are decided before any instance is created.

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `unirun` command isolated from the host's config and automation inputs.
pub(crate) fn unirun(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("unirun"));
    cmd.env("NO_COLOR", "1")
        .env("CI", "1")
        .env("HOME", home)
        .env("UNIRUN_CONFIG", home.join("config.yaml"))
        .env_remove("RUST_LOG");
    for input in [
        "INPUT_WORKDIR",
        "INPUT_KRAFTFILE",
        "INPUT_ARCH",
        "INPUT_PLAT",
        "INPUT_TARGET",
        "INPUT_ARGS",
        "INPUT_MEMORY",
        "INPUT_NAME",
        "INPUT_INITRD",
        "INPUT_LOG_LEVEL",
    ] {
        cmd.env_remove(input);
    }
    cmd
}

pub(crate) fn project(kraftfile: &str) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("Kraftfile"), kraftfile).expect("write Kraftfile");
    dir
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_requires_a_subcommand() {
    let home = TempDir::new().expect("tempdir");
    unirun(home.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("requires a subcommand"))
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_no_color_accepts_conventional_values() {
    let home = TempDir::new().expect("tempdir");
    for value in ["1", "true", "0", ""] {
        unirun(home.path())
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("unirun 0.1.0"));
    }
}

#[test]
fn test_cli_help_lists_commands() {
    let home = TempDir::new().expect("tempdir");
    unirun(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("targets"));
}

#[test]
fn test_run_help_documents_inputs() {
    let home = TempDir::new().expect("tempdir");
    unirun(home.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--memory"))
        .stdout(predicate::str::contains("--initrd"))
        .stdout(predicate::str::contains("INPUT_TARGET"));
}

#[test]
fn test_version_command_shows_version() {
    let home = TempDir::new().expect("tempdir");
    unirun(home.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("unirun 0.1.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let home = TempDir::new().expect("tempdir");
    let output = unirun(home.path())
        .args(["version", "--json"])
        .output()
        .expect("run unirun");
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version --json is JSON");
    assert_eq!(value["version"], "0.1.0");
}

// --- Run failures ---

#[test]
fn test_run_outside_a_project_fails() {
    let home = TempDir::new().expect("tempdir");
    let empty = TempDir::new().expect("tempdir");
    unirun(home.path())
        .args(["run", "--workdir"])
        .arg(empty.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a project"));
}

#[test]
fn test_run_outside_a_project_json_error() {
    let home = TempDir::new().expect("tempdir");
    let empty = TempDir::new().expect("tempdir");
    let output = unirun(home.path())
        .args(["--json", "run", "--workdir"])
        .arg(empty.path())
        .output()
        .expect("run unirun");
    assert_eq!(output.status.code(), Some(2));
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("error is JSON");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "project");
}

#[test]
fn test_run_target_conflicts_with_platform() {
    let home = TempDir::new().expect("tempdir");
    let dir = project("targets:\n  - qemu/x86_64\n");
    unirun(home.path())
        .args(["run", "--target", "hello", "--plat", "qemu", "--workdir"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_run_unbuilt_kernel_fails_before_starting() {
    let home = TempDir::new().expect("tempdir");
    let dir = project("name: hello\ntargets:\n  - qemu/x86_64\n");
    unirun(home.path())
        .args(["run", "--workdir"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("without building the kernel"));
}

#[test]
fn test_run_memory_without_unit_is_rejected() {
    let home = TempDir::new().expect("tempdir");
    let dir = project("name: hello\ntargets:\n  - qemu/x86_64\n");
    unirun(home.path())
        .args(["run", "--memory", "100", "--workdir"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid memory quantity"));
}

#[test]
fn test_run_ambiguous_targets_never_prompts_in_ci() {
    let home = TempDir::new().expect("tempdir");
    let dir = project("name: hello\ntargets:\n  - qemu/x86_64\n  - qemu/arm64\n");
    unirun(home.path())
        .args(["run", "--workdir"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("2 targets match"));
}

#[test]
fn test_invalid_config_is_reported() {
    let home = TempDir::new().expect("tempdir");
    std::fs::write(home.path().join("config.yaml"), "run:\n  teardown_timeout_secs: 0\n")
        .expect("write config");
    let dir = project("name: hello\ntargets:\n  - qemu/x86_64\n");
    unirun(home.path())
        .args(["targets", "--workdir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("run.teardown_timeout_secs"));
}
