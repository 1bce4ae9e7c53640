//! Batch orchestration over one folder.
//!
//! Files are processed strictly one after another. Each file is isolated: a
//! synthesis or ffmpeg failure is logged and the batch moves on. Only
//! configuration problems (missing folder, unresolvable or non-executable
//! ffmpeg, TTS engine that cannot be installed) abort the run.

use super::files::{enumerate_audio_files, AudioFileDescriptor};
use crate::media::{
    AudioProbe, ConcatError, Concatenator, EncodingHint, FfmpegConcatenator, FfprobeAudioProbe,
    Toolchain, ToolchainConfig,
};
use crate::options::ProcessingOptions;
use crate::synth::{LabelRequest, LabelSynthesizer, SynthesisError};
use crate::translit::transliterate;
use crate::{Result, VoiceChapterError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Step of the per-file work that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Synthesis,
    Concatenation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Synthesis => f.write_str("synthesis"),
            Stage::Concatenation => f.write_str("concatenation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Labeled { output: PathBuf },
    Failed { stage: Stage, message: String },
    /// Cancelled while this file was in flight
    Cancelled,
}

/// What happened to every file of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub hint: EncodingHint,
    /// Attempted files in processing order
    pub files: Vec<(PathBuf, FileOutcome)>,
    /// Files never started because the run was cancelled
    pub not_started: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Labeled { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Failed { .. }))
            .count()
    }

    pub fn outcome_of(&self, path: &Path) -> Option<&FileOutcome> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, o)| o)
    }
}

/// Terminal state of a run that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No supported audio file in the folder
    NothingToDo,
    Completed(RunSummary),
    Cancelled(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::NothingToDo => None,
            RunOutcome::Completed(s) | RunOutcome::Cancelled(s) => Some(s),
        }
    }
}

enum FileError {
    Failed(Stage, String),
    Cancelled,
    Fatal(VoiceChapterError),
}

impl From<SynthesisError> for FileError {
    fn from(e: SynthesisError) -> Self {
        match e {
            SynthesisError::Cancelled => FileError::Cancelled,
            e if e.is_fatal() => FileError::Fatal(VoiceChapterError::Synthesis(e)),
            e => FileError::Failed(Stage::Synthesis, e.to_string()),
        }
    }
}

impl From<ConcatError> for FileError {
    fn from(e: ConcatError) -> Self {
        match e {
            ConcatError::Cancelled => FileError::Cancelled,
            e if e.is_fatal() => FileError::Fatal(VoiceChapterError::ToolUnavailable(e.to_string())),
            e => FileError::Failed(Stage::Concatenation, e.to_string()),
        }
    }
}

pub struct BatchPipeline {
    synthesizer: Arc<dyn LabelSynthesizer>,
    toolchain: ToolchainConfig,
}

impl BatchPipeline {
    pub fn new(synthesizer: Arc<dyn LabelSynthesizer>, toolchain: ToolchainConfig) -> Self {
        Self {
            synthesizer,
            toolchain,
        }
    }

    /// Resolve ffmpeg, then label every supported file of `options.folder`.
    pub async fn run(
        &self,
        options: &ProcessingOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        info!(
            target: "pipeline",
            folder = %options.folder.display(),
            provider = %self.synthesizer.provider(),
            "Starting VoiceChapter processing"
        );

        let toolchain =
            Toolchain::resolve(options.ffmpeg_path_or_folder.as_deref(), &self.toolchain)
                .map_err(|e| {
                    error!(target: "pipeline", error = %e, "Cannot configure ffmpeg; aborting before any file is touched");
                    e
                })?;
        let probe = FfprobeAudioProbe::new(toolchain.ffprobe.clone(), cancel.clone());
        let concatenator = FfmpegConcatenator::new(toolchain.ffmpeg.clone());

        self.run_with(options, &probe, &concatenator, cancel).await
    }

    /// The batch loop with explicit probe and concatenator.
    pub async fn run_with(
        &self,
        options: &ProcessingOptions,
        probe: &dyn AudioProbe,
        concatenator: &dyn Concatenator,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let folder = options.folder();
        if !folder.is_dir() {
            error!(target: "pipeline", folder = %folder.display(), "Folder does not exist");
            return Err(VoiceChapterError::FolderNotFound(folder.to_path_buf()));
        }

        let files = enumerate_audio_files(folder).await?;
        if files.is_empty() {
            warn!(target: "pipeline", folder = %folder.display(), "No audio files found in the specified folder");
            return Ok(RunOutcome::NothingToDo);
        }
        info!(target: "pipeline", count = files.len(), folder = %folder.display(), "Found audio file(s)");

        let hint = probe.probe(&files[0]).await;
        let mut summary = RunSummary {
            hint: hint.clone(),
            ..Default::default()
        };

        for (idx, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.not_started = files.len() - idx;
                info!(target: "pipeline", remaining = summary.not_started, "Processing cancelled");
                return Ok(RunOutcome::Cancelled(summary));
            }

            let Some(file) = AudioFileDescriptor::from_path(path) else {
                continue;
            };
            info!(target: "pipeline", file = %file.file_name(), "Processing");

            match self
                .process_file(options, &file, &hint, concatenator, cancel)
                .await
            {
                Ok(output) => {
                    info!(target: "pipeline", output = %output.display(), "  Done");
                    summary
                        .files
                        .push((path.clone(), FileOutcome::Labeled { output }));
                }
                Err(FileError::Failed(stage, message)) => {
                    error!(target: "pipeline", file = %file.file_name(), stage = %stage, error = %message, "  Error while processing file");
                    summary
                        .files
                        .push((path.clone(), FileOutcome::Failed { stage, message }));
                }
                Err(FileError::Cancelled) => {
                    summary.files.push((path.clone(), FileOutcome::Cancelled));
                    summary.not_started = files.len() - idx - 1;
                    info!(target: "pipeline", file = %file.file_name(), "Processing cancelled");
                    return Ok(RunOutcome::Cancelled(summary));
                }
                Err(FileError::Fatal(e)) => {
                    error!(target: "pipeline", file = %file.file_name(), error = %e, "Unrecoverable error; aborting run");
                    return Err(e);
                }
            }
        }

        info!(
            target: "pipeline",
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Processing finished"
        );
        Ok(RunOutcome::Completed(summary))
    }

    async fn process_file(
        &self,
        options: &ProcessingOptions,
        file: &AudioFileDescriptor,
        hint: &EncodingHint,
        concatenator: &dyn Concatenator,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, FileError> {
        let label_path = file.label_temp_path();
        let result = self
            .label_and_join(options, file, &label_path, hint, concatenator, cancel)
            .await;
        remove_label_file(&label_path).await;
        result
    }

    async fn label_and_join(
        &self,
        options: &ProcessingOptions,
        file: &AudioFileDescriptor,
        label_path: &Path,
        hint: &EncodingHint,
        concatenator: &dyn Concatenator,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, FileError> {
        let text = label_text(&file.base_name, options.transliterate);

        info!(target: "pipeline", label = %text, "  Generating spoken label...");
        let request = LabelRequest::new(text, label_path, cancel.clone());
        self.synthesizer.generate_label(options, &request).await?;

        info!(target: "pipeline", "  Concatenating label with original using ffmpeg...");
        let output = file.labeled_output_path();
        concatenator
            .concatenate(label_path, &file.path, &output, hint, cancel)
            .await?;
        Ok(output)
    }
}

/// Spoken text for a file: its base name, transliterated when asked.
pub(crate) fn label_text(base_name: &str, transliterate_text: bool) -> String {
    if transliterate_text {
        transliterate(base_name)
    } else {
        base_name.to_string()
    }
}

async fn remove_label_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            debug!(target: "pipeline", path = %path.display(), error = %e, "Failed to delete temporary label file")
        }
    }
}
