//! Cancellable subprocess execution.
//!
//! Every external tool (ffmpeg, ffprobe, espeak-ng, piper) goes through
//! [`run_cancellable`]: the child is spawned with `kill_on_drop`, its output is
//! captured, and a cancelled token kills and reaps the child before returning.

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started at all (missing, not executable,
    /// wrong architecture); every retry fails the same way.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr lines, enough to explain a failure in a log line.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Run `cmd` to completion, feeding `stdin` if given, unless `cancel` fires first.
pub async fn run_cancellable(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let program = program_name(&cmd);
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    debug!(target: "process", command = ?cmd.as_std(), "Spawning external tool");
    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program, source })?;

    let stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let feed = async move {
        if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, stdin) {
            // A tool that exits early closes its stdin; the exit status tells the story
            let _ = pipe.write_all(&bytes).await;
            let _ = pipe.shutdown().await;
        }
    };
    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let finished = async {
        let (_, stdout, stderr) = tokio::join!(feed, read_stdout, read_stderr);
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout?, stderr?))
    };

    let outcome = tokio::select! {
        res = finished => Some(res),
        _ = cancel.cancelled() => None,
    };

    match outcome {
        Some(res) => {
            let (status, stdout, stderr) = res?;
            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
            })
        }
        None => {
            debug!(target: "process", program = %program_name(&cmd), "Cancellation requested; killing child");
            let _ = child.kill().await;
            Err(ProcessError::Cancelled)
        }
    }
}

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().to_string()
}
