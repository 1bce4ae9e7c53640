/// ffmpeg integration
///
/// Architecture:
/// - `toolchain`: Locates ffmpeg/ffprobe (explicit file, folder, or auto-provision)
/// - `probe`: Reads codec and bit rate of one sample file (AudioProbe)
/// - `concat`: Joins label + original into one output file (Concatenator)
pub mod concat;
pub mod probe;
pub mod toolchain;

pub use concat::{ConcatError, Concatenator, FfmpegConcatenator, CONCAT_FILTER};
pub use probe::{AudioProbe, EncodingHint, FfprobeAudioProbe};
pub use toolchain::{Toolchain, ToolchainConfig};
