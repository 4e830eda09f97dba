use std::process::Command;

use anyhow::Result;
use rstest::*;

fn buildpkg() -> Command {
    Command::new(env!("CARGO_BIN_EXE_buildpkg"))
}

#[rstest]
fn test_help_lists_actions() -> Result<()> {
    let output = buildpkg().arg("--help").output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("build"));
    assert!(stdout.contains("create"));
    assert!(stdout.contains("destroy"));
    Ok(())
}

#[rstest]
fn test_version() -> Result<()> {
    let output = buildpkg().arg("--version").output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("buildpkg"));
    Ok(())
}

#[rstest]
fn test_bad_log_level_is_rejected() -> Result<()> {
    let output = buildpkg()
        .args(["--no-config", "--log-level=chatty", "build"])
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--log-level"));
    Ok(())
}

#[rstest]
fn test_unknown_action_is_rejected() -> Result<()> {
    let output = buildpkg().args(["--no-config", "demolish"]).output()?;
    assert!(!output.status.success());
    Ok(())
}

/// Destroying a directory that was never provisioned must fail whether or
/// not we have the rights to try: unprivileged runs stop at the permission
/// check, privileged runs stop at the missing marker file.
#[rstest]
fn test_destroy_refuses_non_container() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("no-container");
    std::fs::create_dir(&dir)?;

    let output = buildpkg()
        .args(["--no-config", "destroy"])
        .arg(&dir)
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("is not a container")
            || stderr.contains("Insufficient permissions"),
        "unexpected stderr: {}",
        stderr
    );
    Ok(())
}
