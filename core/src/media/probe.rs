//! Encoding hint discovery from one representative file.

use crate::process::{run_cancellable, ProcessError};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Codec and bit rate handed to ffmpeg for every output of a run.
/// `None` leaves the choice to ffmpeg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingHint {
    pub codec: Option<String>,
    /// Bits per second, always > 0 when present
    pub bit_rate: Option<u64>,
}

impl EncodingHint {
    pub fn is_empty(&self) -> bool {
        self.codec.is_none() && self.bit_rate.is_none()
    }
}

impl fmt::Display for EncodingHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codec = self.codec.as_deref().unwrap_or("unknown");
        match self.bit_rate {
            Some(b) => write!(f, "codec {}, {} bps", codec, b),
            None => write!(f, "codec {}, bitrate unknown", codec),
        }
    }
}

#[derive(Error, Debug)]
pub(crate) enum ProbeError {
    #[error("ffprobe is not available")]
    NoProbeTool,

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("ffprobe exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Unreadable ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No audio stream")]
    NoAudioStream,
}

/// Inspects one audio file. Never fails: problems degrade to an empty hint.
#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn probe(&self, file: &Path) -> EncodingHint;
}

/// [`AudioProbe`] backed by `ffprobe -of json`.
pub struct FfprobeAudioProbe {
    ffprobe: Option<PathBuf>,
    cancel: CancellationToken,
}

impl FfprobeAudioProbe {
    pub fn new(ffprobe: Option<PathBuf>, cancel: CancellationToken) -> Self {
        Self { ffprobe, cancel }
    }

    async fn try_probe(&self, file: &Path) -> Result<EncodingHint, ProbeError> {
        let ffprobe = self.ffprobe.as_ref().ok_or(ProbeError::NoProbeTool)?;

        let mut cmd = Command::new(ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=codec_name,bit_rate",
            "-of",
            "json",
        ])
        .arg(file);

        let output = run_cancellable(cmd, None, &self.cancel).await?;
        if !output.success() {
            return Err(ProbeError::Failed {
                code: output.status.code(),
                stderr: output.stderr_tail(3),
            });
        }
        parse_probe_output(&output.stdout)
    }
}

#[async_trait]
impl AudioProbe for FfprobeAudioProbe {
    async fn probe(&self, file: &Path) -> EncodingHint {
        match self.try_probe(file).await {
            Ok(hint) => {
                info!(
                    target: "ffprobe",
                    file = %file.display(),
                    codec = hint.codec.as_deref().unwrap_or("unknown"),
                    bitrate = ?hint.bit_rate,
                    "Detected source audio settings (from first file)"
                );
                hint
            }
            Err(e) => {
                warn!(target: "ffprobe", file = %file.display(), error = %e, "Could not analyze source audio; letting ffmpeg pick defaults");
                EncodingHint::default()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    // ffprobe prints bit_rate as a JSON string
    bit_rate: Option<serde_json::Value>,
}

fn parse_probe_output(stdout: &[u8]) -> Result<EncodingHint, ProbeError> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or(ProbeError::NoAudioStream)?;

    let codec = stream
        .codec_name
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let bit_rate = stream.bit_rate.and_then(|v| match v {
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    });

    Ok(EncodingHint {
        codec,
        bit_rate: bit_rate.filter(|b| *b > 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codec_and_bitrate() {
        let json = br#"{"programs":[],"streams":[{"codec_name":"mp3","bit_rate":"128000"}]}"#;
        let hint = parse_probe_output(json).unwrap();
        assert_eq!(hint.codec.as_deref(), Some("mp3"));
        assert_eq!(hint.bit_rate, Some(128_000));
    }

    #[test]
    fn test_zero_or_missing_bitrate_dropped() {
        let json = br#"{"streams":[{"codec_name":"flac","bit_rate":"0"}]}"#;
        let hint = parse_probe_output(json).unwrap();
        assert_eq!(hint.codec.as_deref(), Some("flac"));
        assert_eq!(hint.bit_rate, None);

        let json = br#"{"streams":[{"codec_name":"vorbis"}]}"#;
        assert_eq!(parse_probe_output(json).unwrap().bit_rate, None);
    }

    #[test]
    fn test_blank_codec_dropped() {
        let json = br#"{"streams":[{"codec_name":"  ","bit_rate":"96000"}]}"#;
        let hint = parse_probe_output(json).unwrap();
        assert!(hint.codec.is_none());
        assert_eq!(hint.bit_rate, Some(96_000));
    }

    #[test]
    fn test_no_audio_stream_is_error() {
        let json = br#"{"streams":[]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProbeError::NoAudioStream)
        ));
    }

    #[tokio::test]
    async fn test_missing_ffprobe_degrades_to_empty_hint() {
        let probe = FfprobeAudioProbe::new(None, CancellationToken::new());
        let hint = probe.probe(Path::new("/music/a.mp3")).await;
        assert!(hint.is_empty());

        let probe = FfprobeAudioProbe::new(
            Some(PathBuf::from("/nonexistent/ffprobe")),
            CancellationToken::new(),
        );
        assert!(probe.probe(Path::new("/music/a.mp3")).await.is_empty());
    }
}
