mod common;

use std::fs;

use predicates::prelude::*;
use tempfile::tempdir;

use common::pake_cmd;

#[test]
fn builds_an_object_file_from_its_source() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main() {}").unwrap();

    pake_cmd(dir.path())
        .arg("a.o")
        .assert()
        .success()
        .stdout(predicate::str::contains("rebuilt 1 target"));

    assert_eq!(
        fs::read_to_string(dir.path().join("a.o")).unwrap(),
        "int main() {}"
    );
}

#[test]
fn second_run_with_unchanged_source_rebuilds_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "content").unwrap();

    pake_cmd(dir.path()).arg("a.o").assert().success();
    pake_cmd(dir.path())
        .arg("a.o")
        .assert()
        .success()
        .stdout(predicate::str::contains("rebuilt 0 target"));
}

#[test]
fn missing_source_exits_with_code_one() {
    let dir = tempdir().unwrap();

    pake_cmd(dir.path())
        .arg("a.o")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn no_targets_and_no_default_rule_exits_with_code_two() {
    let dir = tempdir().unwrap();

    pake_cmd(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no rule matches"));
}

#[test]
fn json_output_flag_emits_a_single_json_line() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "x").unwrap();

    pake_cmd(dir.path())
        .args(["--json", "a.o"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rebuilt\":1"));
}

#[test]
fn custom_root_flag_is_honored() {
    let outer = tempdir().unwrap();
    let inner = outer.path().join("project");
    fs::create_dir(&inner).unwrap();
    fs::write(inner.join("a.c"), "y").unwrap();

    pake_cmd(outer.path())
        .args(["--root", inner.to_str().unwrap(), "a.o"])
        .assert()
        .success();

    assert!(inner.join("a.o").exists());
}

#[test]
fn custom_state_file_flag_is_honored() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "z").unwrap();

    pake_cmd(dir.path())
        .args(["--state-file", "custom-state.json", "a.o"])
        .assert()
        .success();

    assert!(dir.path().join("custom-state.json").exists());
    assert!(!dir.path().join(".pake-state").exists());
}
