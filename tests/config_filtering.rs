mod common;

use std::fs;

use predicates::prelude::*;
use tempfile::tempdir;

use common::pake_cmd;

#[test]
fn pake_toml_state_file_override_is_honored_with_no_cli_flag() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "x").unwrap();
    fs::write(
        dir.path().join("pake.toml"),
        "[engine]\nstate_file = \"build-cache.json\"\n",
    )
    .unwrap();

    pake_cmd(dir.path()).arg("a.o").assert().success();

    assert!(dir.path().join("build-cache.json").exists());
    assert!(!dir.path().join(".pake-state").exists());
}

#[test]
fn cli_state_file_flag_takes_precedence_over_config_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "x").unwrap();
    fs::write(
        dir.path().join("pake.toml"),
        "[engine]\nstate_file = \"from-config.json\"\n",
    )
    .unwrap();

    pake_cmd(dir.path())
        .args(["--state-file", "from-cli.json", "a.o"])
        .assert()
        .success();

    assert!(dir.path().join("from-cli.json").exists());
    assert!(!dir.path().join("from-config.json").exists());
}

#[test]
fn pake_toml_root_override_redirects_where_targets_resolve() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub").join("a.c"), "x").unwrap();
    fs::write(dir.path().join("pake.toml"), "[engine]\nroot = \"sub\"\n").unwrap();

    pake_cmd(dir.path()).arg("a.o").assert().success();

    assert!(dir.path().join("sub").join("a.o").exists());
}

#[test]
fn malformed_pake_toml_is_reported_as_a_config_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("pake.toml"), "not = [valid toml").unwrap();

    pake_cmd(dir.path())
        .arg("anything")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config error"));
}

#[test]
fn missing_pake_toml_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "x").unwrap();

    pake_cmd(dir.path()).arg("a.o").assert().success();

    assert!(dir.path().join(".pake-state").exists());
}
