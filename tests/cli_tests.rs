//! Tests for the CLI argument surface of the `pullrun` binary.
//!
//! Network pulls and the privileged sandbox entry are not exercised here;
//! these pin the argument contract and the infra exit code for misuse.

use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_pullrun");

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(BIN).args(args).output().unwrap()
}

#[test]
fn test_no_arguments_is_an_infra_failure_with_usage() {
    let out = run_cli(&[]);
    assert_eq!(out.status.code(), Some(125));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("usage: pullrun run"), "stderr: {stderr}");
}

#[test]
fn test_unknown_subcommand_rejected() {
    let out = run_cli(&["pull"]);
    assert_eq!(out.status.code(), Some(125));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown subcommand"));
}

#[test]
fn test_run_requires_image_and_command() {
    assert_eq!(run_cli(&["run"]).status.code(), Some(125));
    assert_eq!(run_cli(&["run", "busybox"]).status.code(), Some(125));
}

#[test]
fn test_invalid_image_name_fails_before_any_fetch() {
    let out = run_cli(&["run", "../etc", "/bin/echo", "hi"]);
    assert_eq!(out.status.code(), Some(125));
    assert!(out.stdout.is_empty(), "nothing may reach stdout on failure");
}
