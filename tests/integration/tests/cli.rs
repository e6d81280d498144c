//! CLI binary integration tests.
//!
//! These exercise the compiled `qqbot` binary: command routing, help text
//! and config error handling.

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Locate the compiled `qqbot` binary in the workspace target directory.
fn qqbot_bin() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    // tests/integration -> workspace root
    let workspace_root = manifest_dir
        .parent()
        .expect("tests/ parent")
        .parent()
        .expect("workspace root");
    let bin = workspace_root.join("target").join("debug").join("qqbot");
    assert!(
        bin.exists(),
        "qqbot binary not found at {}; run `cargo build -p qqbot-cli` first",
        bin.display()
    );
    bin
}

fn qqbot_cmd() -> Command {
    let mut cmd = Command::new(qqbot_bin());
    cmd.env_remove("QQBOT_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_version() {
    let output = qqbot_cmd().arg("version").output().expect("failed to run qqbot");
    assert!(output.status.success(), "version command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("qqbot"), "got: {}", stdout);
}

#[test]
fn test_cli_help_lists_commands() {
    let output = qqbot_cmd().arg("--help").output().expect("failed to run qqbot");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "check", "sessions"] {
        assert!(stdout.contains(command), "help should mention '{}': {}", command, stdout);
    }
}

#[test]
fn test_cli_unknown_command_fails() {
    let output = qqbot_cmd().arg("frobnicate").output().expect("failed to run qqbot");
    assert!(!output.status.success());
}

#[test]
fn test_check_reports_missing_credentials() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bot.json5");
    std::fs::write(&path, "{ credentials: { app_id: \"\" } }").unwrap();

    let output = qqbot_cmd()
        .args(["--config", path.to_str().unwrap(), "check"])
        .output()
        .expect("failed to run qqbot");
    assert!(!output.status.success(), "invalid config must fail the check");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("app_id"), "got: {}", stdout);
}

#[test]
fn test_check_accepts_valid_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bot.json5");
    std::fs::write(
        &path,
        "{ credentials: { app_id: \"10001\", secret: \"s3cret\" }, dispatch: { message_intent: \"all\" } }",
    )
    .unwrap();

    let output = qqbot_cmd()
        .args(["--config", path.to_str().unwrap(), "check"])
        .output()
        .expect("failed to run qqbot");
    assert!(output.status.success(), "stdout: {}", String::from_utf8_lossy(&output.stdout));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[guild_messages"), "got: {}", stdout);
}

#[test]
fn test_sessions_without_snapshot() {
    let dir = TempDir::new().unwrap();
    let output = qqbot_cmd()
        .args(["sessions", "10001", "--dir", dir.path().to_str().unwrap()])
        .output()
        .expect("failed to run qqbot");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No snapshot"), "got: {}", stdout);
}
