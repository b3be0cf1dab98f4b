//! Async process execution for the control plane.
//!
//! Every invocation takes a program and an argument vector, and is
//! spawned directly, never through a shell. Argument contents can
//! therefore not change the structure of the command, which is what
//! lets sanitized client strings (urls, refs, paths) appear in argv
//! at all.

use std::{process::Stdio, time::Duration};

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to collect {program} output: {source}")]
  Output {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{program} timed out after {timeout_secs}s")]
  Timeout { program: String, timeout_secs: u64 },
}

impl Error {
  pub fn is_timeout(&self) -> bool {
    matches!(self, Error::Timeout { .. })
  }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
  /// None when the process was killed by a signal.
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// Run `program` with `args`, capturing stdout / stderr until exit.
pub async fn run(
  program: &str,
  args: &[String],
) -> Result<CommandOutput, Error> {
  let output = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .output()
    .await
    .map_err(|source| Error::Spawn {
      program: program.to_string(),
      source,
    })?;
  Ok(CommandOutput {
    exit_code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

/// [run] with a deadline. The child is killed when the deadline
/// passes.
pub async fn run_with_timeout(
  program: &str,
  args: &[String],
  timeout: Duration,
) -> Result<CommandOutput, Error> {
  let child = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .map_err(|source| Error::Spawn {
      program: program.to_string(),
      source,
    })?;
  let output =
    tokio::time::timeout(timeout, child.wait_with_output())
      .await
      .map_err(|_| Error::Timeout {
        program: program.to_string(),
        timeout_secs: timeout.as_secs(),
      })?
      .map_err(|source| Error::Output {
        program: program.to_string(),
        source,
      })?;
  Ok(CommandOutput {
    exit_code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn captures_stdout_and_exit_code() {
    let output = run("echo", &[String::from("hello")])
      .await
      .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn metacharacters_stay_literal() {
    // Anything an attacker smuggles into argv stays a plain
    // argument.
    let output =
      run("echo", &[String::from("a; rm -rf / | b && c")])
        .await
        .unwrap();
    assert_eq!(output.stdout.trim(), "a; rm -rf / | b && c");
  }

  #[tokio::test]
  async fn reports_nonzero_exit() {
    let output =
      run("false", &[]).await.unwrap();
    assert!(!output.success());
  }

  #[tokio::test]
  async fn kills_on_timeout() {
    let err = run_with_timeout(
      "sleep",
      &[String::from("5")],
      Duration::from_millis(100),
    )
    .await
    .unwrap_err();
    assert!(err.is_timeout());
  }
}
