//! One external tool invocation with a wall-clock budget.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::EngineError;

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Last few stderr lines, which is where ffmpeg puts the actual error.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().rev().take(5).collect();
        lines.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout,
        }
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Run to completion. A non-zero exit is returned as `Ok` so callers can
    /// map it onto their own error variant; spawn failures and timeouts are
    /// errors. The child is killed if the budget runs out.
    pub async fn run(&self) -> Result<ToolOutput, EngineError> {
        debug!(program = ?self.program, args = ?self.args, "running tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::BinaryNotFound(self.program.clone())
                } else {
                    EngineError::Io(e)
                }
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(EngineError::Io(e)),
            // Dropping the wait future drops the child, and kill_on_drop reaps it.
            Err(_) => Err(EngineError::Timeout {
                tool: self.tool_name(),
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let cmd = ToolCommand::new(
            PathBuf::from("/definitely/not/here/ffprobe"),
            Duration::from_secs(1),
        );
        let err = cmd.run().await.unwrap_err();
        assert!(matches!(err, EngineError::BinaryNotFound(_)));
    }

    #[tokio::test]
    async fn overrunning_tool_is_stopped_at_its_budget() {
        let mut cmd = ToolCommand::new(PathBuf::from("sleep"), Duration::from_millis(150));
        cmd.args(["5"]);

        let started = std::time::Instant::now();
        let err = cmd.run().await.unwrap_err();
        match err {
            EngineError::Timeout { tool, after } => {
                assert_eq!(tool, "sleep");
                assert_eq!(after, Duration::from_millis(150));
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let out = ToolOutput {
            status: std::process::ExitStatus::default(),
            stdout: Vec::new(),
            stderr: (1..=8).map(|i| format!("line{i}\n")).collect(),
        };
        assert_eq!(out.stderr_tail(), "line4\nline5\nline6\nline7\nline8");
    }
}
