//! # Command Execution
//!
//! Launches the target command inside the already-entered sandbox, captures
//! its standard streams, and relays them with the exact exit code.
//!
//! Streams are buffered, not relayed live. That is acceptable for
//! short-lived commands and a known scalability limit for long-running or
//! high-volume-output processes.

use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};

/// Immutable description of the process to launch inside the sandbox.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Absolute path as it resolves inside the sandboxed root.
    pub path: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
}

/// Terminal artifact of a run.
///
/// A nonzero `exit_code` is the child's own result, not a system error;
/// it is the authoritative signal back to the invoking shell.
#[derive(Debug)]
pub struct ExecutionResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

/// Runs commands and captures their output.
pub struct CommandRunner;

impl CommandRunner {
    /// Executes `spec` and captures its streams.
    ///
    /// A command that cannot be launched at all (not found, not
    /// executable) surfaces as [`Error::Exec`], distinguishable from a
    /// command that ran and exited nonzero.
    pub async fn run(spec: &CommandSpec) -> Result<ExecutionResult> {
        debug!(path = %spec.path, args = ?spec.args, "launching command");

        let output = tokio::process::Command::new(&spec.path)
            .args(&spec.args)
            .output()
            .await
            .map_err(|e| Error::Exec {
                path: spec.path.clone(),
                reason: e.to_string(),
            })?;

        let exit_code = exit_code_of(&output.status);
        debug!(exit_code, "command completed");

        Ok(ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}

/// Exit code of a finished child, following the shell convention of
/// `128 + signal` for signal deaths.
pub fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// Writes the child's streams to the parent's, returning the exit code the
/// parent must terminate with.
///
/// Stdout is trimmed of trailing whitespace and re-terminated with a single
/// newline; stderr passes through verbatim.
pub fn relay(result: &ExecutionResult) -> i32 {
    let trimmed = trim_trailing_whitespace(&result.stdout);
    if !trimmed.is_empty() {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(trimmed);
        let _ = stdout.write_all(b"\n");
        let _ = stdout.flush();
    }

    if !result.stderr.is_empty() {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(&result.stderr);
        let _ = stderr.flush();
    }

    result.exit_code
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
