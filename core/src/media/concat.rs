//! Joining the spoken label and the original file with ffmpeg.

use super::probe::EncodingHint;
use crate::process::{run_cancellable, ProcessError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Two audio inputs in, one audio stream out.
pub const CONCAT_FILTER: &str = "[0:a][1:a]concat=n=2:v=0:a=1[a]";

#[derive(Error, Debug)]
pub enum ConcatError {
    /// ffmpeg could not be executed at all; no later file can succeed either.
    #[error("ffmpeg unavailable at '{path}': {reason}")]
    ToolUnavailable { path: PathBuf, reason: String },

    #[error("ffmpeg failed with exit code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Concatenation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConcatError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConcatError::ToolUnavailable { .. })
    }
}

/// Prepends `label` to `original`, writing `output` (overwritten if present).
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concatenate(
        &self,
        label: &Path,
        original: &Path,
        output: &Path,
        hint: &EncodingHint,
        cancel: &CancellationToken,
    ) -> Result<(), ConcatError>;
}

/// [`Concatenator`] running the resolved ffmpeg binary.
pub struct FfmpegConcatenator {
    ffmpeg: PathBuf,
}

impl FfmpegConcatenator {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

/// ffmpeg arguments for one concatenation.
pub fn build_concat_args(
    label: &Path,
    original: &Path,
    output: &Path,
    hint: &EncodingHint,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        label.into(),
        "-i".into(),
        original.into(),
        "-filter_complex".into(),
        CONCAT_FILTER.into(),
        "-map".into(),
        "[a]".into(),
    ];
    if let Some(codec) = &hint.codec {
        args.push("-c:a".into());
        args.push(codec.into());
    }
    if let Some(bit_rate) = hint.bit_rate {
        args.push("-b:a".into());
        args.push(bit_rate.to_string().into());
    }
    args.push(output.into());
    args
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concatenate(
        &self,
        label: &Path,
        original: &Path,
        output: &Path,
        hint: &EncodingHint,
        cancel: &CancellationToken,
    ) -> Result<(), ConcatError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(build_concat_args(label, original, output, hint));

        debug!(target: "ffmpeg", output = %output.display(), hint = %hint, "Concatenating label with original");
        let result = match run_cancellable(cmd, None, cancel).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(ConcatError::Failed {
                code: out.status.code(),
                stderr: out.stderr_tail(5),
            }),
            Err(ProcessError::Cancelled) => Err(ConcatError::Cancelled),
            Err(e @ ProcessError::Spawn { .. }) => Err(ConcatError::ToolUnavailable {
                path: self.ffmpeg.clone(),
                reason: e.to_string(),
            }),
            Err(ProcessError::Io(e)) => Err(ConcatError::Io(e)),
        };

        if result.is_err() {
            remove_incomplete_output(output).await;
        }
        result
    }
}

async fn remove_incomplete_output(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {
            info!(target: "ffmpeg", path = %output.display(), "Removed incomplete output")
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            debug!(target: "ffmpeg", path = %output.display(), error = %e, "Failed to remove incomplete output")
        }
    }
}
