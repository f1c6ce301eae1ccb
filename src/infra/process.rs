//! External process execution
//!
//! Spawns resolved build commands, streams their stdout/stderr line by line
//! as tagged output events, and backs cancellation with a hard kill. The
//! only error path is a failed spawn; everything after that resolves to a
//! [`ProcessResult`] so the scheduler can always advance.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::environment::Environment;
use crate::core::events::EventSink;
use crate::core::task::{OutputEvent, OutputFormat};
use crate::error::ProcessError;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// The process exited on its own with this code
    Exited(i32),
    /// The process was terminated without reporting an exit code
    Crashed,
    /// The process was killed after a cancellation request
    Cancelled,
}

impl ProcessResult {
    /// True for a clean zero exit
    pub fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// One fully resolved command invocation
#[derive(Debug)]
pub struct Invocation<'a> {
    pub program: &'a Path,
    pub arguments: &'a [String],
    pub working_directory: &'a Path,
    pub environment: &'a Environment,
}

/// Run the invocation to completion, streaming output as events
///
/// stdout lines are forwarded as `Stdout` output events, stderr lines as
/// `Stderr`. The child sees exactly the given environment. When `cancel`
/// fires the child is killed and `Cancelled` is returned.
pub async fn run(
    invocation: Invocation<'_>,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<ProcessResult, ProcessError> {
    let mut command = Command::new(invocation.program);
    command
        .args(invocation.arguments)
        .current_dir(invocation.working_directory)
        .env_clear()
        .envs(invocation.environment.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|error| ProcessError::Spawn {
        command: invocation.program.display().to_string(),
        error: error.to_string(),
    })?;

    let stdout = child.stdout.take();
    let stdout_events = events.clone();
    let stdout_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                stdout_events.output(OutputEvent::line(line, OutputFormat::Stdout));
            }
        }
    });

    let stderr = child.stderr.take();
    let stderr_events = events.clone();
    let stderr_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                stderr_events.output(OutputEvent::line(line, OutputFormat::Stderr));
            }
        }
    });

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            if let Err(error) = child.kill().await {
                tracing::warn!(error = %error, "Failed to kill cancelled child process");
            }
            ProcessResult::Cancelled
        }
        status = child.wait() => match status {
            Ok(status) => match status.code() {
                Some(code) => ProcessResult::Exited(code),
                None => ProcessResult::Crashed,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Failed to collect child exit status");
                ProcessResult::Crashed
            }
        },
    };

    // Drain whatever the child flushed before it went away.
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    Ok(result)
}
