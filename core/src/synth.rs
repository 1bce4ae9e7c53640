//! Label synthesis capability.
//!
//! The pipeline only knows this trait; engines live in the `voicechapter-tts`
//! crate and are picked once from [`TtsProvider`] when the app starts.

use crate::options::{ProcessingOptions, TtsProvider};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Engine binary or voice model is missing and could not be provisioned.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Synthesis cancelled")]
    Cancelled,

    #[error("Engine failed: {0}")]
    EngineFailed(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Failures no later file can recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SynthesisError::Unavailable(_) | SynthesisError::Download(_)
        )
    }
}

/// One label to speak.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    /// Text to speak (file base name, possibly transliterated)
    pub text: String,
    /// Waveform file to create or overwrite
    pub output_path: PathBuf,
    pub cancel: CancellationToken,
}

impl LabelRequest {
    pub fn new(
        text: impl Into<String>,
        output_path: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            text: text.into(),
            output_path: output_path.into(),
            cancel,
        }
    }
}

/// Turns text into a single-channel WAV file ffmpeg can read.
#[async_trait]
pub trait LabelSynthesizer: Send + Sync {
    /// The provider variant this engine implements
    fn provider(&self) -> TtsProvider;

    /// Write the spoken `request.text` to `request.output_path`, overwriting it.
    async fn generate_label(
        &self,
        options: &ProcessingOptions,
        request: &LabelRequest,
    ) -> Result<(), SynthesisError>;
}
