//! Integration tests for `unirun targets`.

#![allow(clippy::expect_used)]

use predicates::prelude::*;
use tempfile::TempDir;

use crate::cli_tests::{project, unirun};

const KRAFTFILE: &str = "\
name: hello
targets:
  - qemu/x86_64
  - platform: qemu
    architecture: arm64
  - name: debug
    plat: qemu
    arch: x86_64
    kernel: out/debug
";

#[test]
fn test_targets_table_marks_build_state() {
    let home = TempDir::new().expect("tempdir");
    let dir = project(KRAFTFILE);
    let built = dir.path().join(".unikraft/build/hello_qemu-x86_64");
    std::fs::create_dir_all(built.parent().expect("parent")).expect("mkdir");
    std::fs::write(&built, b"kernel").expect("write kernel");

    unirun(home.path())
        .args(["targets", "--workdir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("qemu/x86_64"))
        .stdout(predicate::str::contains("qemu/arm64"))
        .stdout(predicate::str::contains("debug"))
        .stdout(predicate::str::contains("not built"));
}

#[test]
fn test_targets_json_lists_every_target() {
    let home = TempDir::new().expect("tempdir");
    let dir = project(KRAFTFILE);

    let output = unirun(home.path())
        .args(["targets", "--json", "--workdir"])
        .arg(dir.path())
        .output()
        .expect("run unirun");
    assert!(output.status.success());

    let rows: Vec<serde_json::Value> =
        serde_json::from_slice(&output.stdout).expect("targets --json is JSON");
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, ["qemu/x86_64", "qemu/arm64", "debug"]);
    assert!(rows.iter().all(|r| r["built"] == false));
    assert!(
        rows[2]["kernel"]
            .as_str()
            .expect("kernel path")
            .ends_with("out/debug")
    );
}

#[test]
fn test_targets_filters_by_architecture() {
    let home = TempDir::new().expect("tempdir");
    let dir = project(KRAFTFILE);

    let output = unirun(home.path())
        .args(["targets", "--json", "--arch", "arm64", "--workdir"])
        .arg(dir.path())
        .output()
        .expect("run unirun");
    let rows: Vec<serde_json::Value> =
        serde_json::from_slice(&output.stdout).expect("targets --json is JSON");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["architecture"], "arm64");
}

#[test]
fn test_targets_accepts_inline_kraftfile() {
    let home = TempDir::new().expect("tempdir");
    let empty = TempDir::new().expect("tempdir");

    unirun(home.path())
        .args(["targets", "--json", "--workdir"])
        .arg(empty.path())
        .args(["--kraftfile", "name: inline\ntargets:\n  - qemu/arm64\n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"qemu/arm64\""));
}
