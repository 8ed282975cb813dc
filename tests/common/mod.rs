use std::path::Path;
use std::process::Command;

use assert_cmd::cargo::CommandCargoExt;

/// Builds a `pake` command rooted at `dir`, ready for `.args([...])`.
pub fn pake_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pake").expect("pake binary builds");
    cmd.current_dir(dir);
    cmd
}
