// VoiceChapter Core Library
// Prepends a spoken file-name label to every audio file of a folder

pub mod media;
pub mod options;
pub mod pipeline;
pub mod process;
pub mod synth;
pub mod translit;

// Export core types
pub use media::{
    AudioProbe, ConcatError, Concatenator, EncodingHint, FfmpegConcatenator, FfprobeAudioProbe,
    Toolchain, ToolchainConfig,
};
pub use options::{ProcessingOptions, TtsProvider, DEFAULT_MODEL_KEY};
pub use pipeline::{AudioFileDescriptor, BatchPipeline, FileOutcome, RunOutcome, RunSummary};
pub use synth::{LabelRequest, LabelSynthesizer, SynthesisError};
pub use tokio_util::sync::CancellationToken;

// Error types
use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors. Every variant aborts the batch before (or instead of)
/// processing further files.
#[derive(Error, Debug)]
pub enum VoiceChapterError {
    #[error("Folder does not exist: {0}")]
    FolderNotFound(PathBuf),

    #[error("ffmpeg could not be resolved: {0}")]
    ToolchainUnresolved(String),

    #[error("ffmpeg is not executable: {0}")]
    ToolUnavailable(String),

    #[error("TTS engine unavailable: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VoiceChapterError>;
