use assert_cmd::prelude::*;
use predicates::{prelude::*, str::contains};
use std::process::Command;

#[test]
fn displays_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("docweave")?;
    cmd.arg("--help");
    cmd.assert().success();
    Ok(())
}

#[test]
fn requires_manifest_and_destination_arguments() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("docweave")?;
    cmd.assert()
        .failure()
        .code(predicate::eq(2))
        .stderr(contains("--manifest"));
    Ok(())
}

#[test]
fn prints_version_information() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("docweave")?;
    cmd.arg("-V");
    cmd.assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}
