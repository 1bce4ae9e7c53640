// Batch labelling: enumerate → probe first file → synthesize → concatenate → clean up

mod batch;
mod files;

pub use batch::{BatchPipeline, FileOutcome, RunOutcome, RunSummary, Stage};
pub use files::{enumerate_audio_files, is_supported, AudioFileDescriptor, SUPPORTED_EXTENSIONS};
