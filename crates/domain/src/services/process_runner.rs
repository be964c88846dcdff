//! External process invocation.

use std::io;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `(cmd, args) -> (exit_code, stdout, stderr)`.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, cmd: &str, args: &[String]) -> io::Result<ProcessOutput>;
}

/// Runs commands with `tokio::process`.
///
/// The child is killed when the returned future is dropped, so an outer
/// timeout does not leave a stray dump process behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, cmd: &str, args: &[String]) -> io::Result<ProcessOutput> {
        let output = tokio::process::Command::new(cmd)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_command_and_captures_output() {
        let output = TokioProcessRunner
            .run("sh", &["-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let result = TokioProcessRunner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await;
        assert!(result.is_err());
    }
}
