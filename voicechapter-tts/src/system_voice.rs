//! System voice labels via espeak-ng.
//!
//! espeak-ng writes the WAV itself (`-w <out>`), text is fed on stdin so file
//! names starting with `-` are never read as flags.
//!
//! Env overrides:
//! - ESPEAK_BIN, ESPEAK_VOICE
//! - TTS_TIMEOUT_MS

use crate::rate::espeak_words_per_minute;
use crate::utils::{get_from_env_or_path, get_from_path, timeout_ms_from_env};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};
use voicechapter_core::process::{run_cancellable, ProcessError};
use voicechapter_core::{
    LabelRequest, LabelSynthesizer, ProcessingOptions, SynthesisError, TtsProvider,
};

#[derive(Clone, Debug)]
pub struct SystemVoiceConfig {
    pub espeak_bin: Option<PathBuf>,
    /// espeak voice code (e.g. "en-gb"); engine default when `None`
    pub voice: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SystemVoiceConfig {
    fn default() -> Self {
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        let voice = std::env::var("ESPEAK_VOICE").ok().filter(|s| !s.is_empty());
        Self {
            espeak_bin,
            voice,
            timeout_ms: timeout_ms_from_env(),
        }
    }
}

pub struct SystemVoiceSynthesizer {
    cfg: SystemVoiceConfig,
}

impl SystemVoiceSynthesizer {
    pub fn new(cfg: SystemVoiceConfig) -> Self {
        if let Some(ref e) = cfg.espeak_bin {
            info!(target: "tts", bin = ?e, "Detected espeak-ng binary");
        }
        Self { cfg }
    }

    fn command(&self, espeak: &Path, rate: i32, output: &Path) -> Command {
        let mut cmd = Command::new(espeak);
        if let Some(voice) = &self.cfg.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("-s").arg(espeak_words_per_minute(rate).to_string());
        cmd.arg("-w").arg(output);
        cmd.arg("--stdin");
        cmd
    }
}

#[async_trait]
impl LabelSynthesizer for SystemVoiceSynthesizer {
    fn provider(&self) -> TtsProvider {
        TtsProvider::SystemVoice
    }

    async fn generate_label(
        &self,
        options: &ProcessingOptions,
        request: &LabelRequest,
    ) -> Result<(), SynthesisError> {
        if request.cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        let espeak = self.cfg.espeak_bin.as_ref().ok_or_else(|| {
            SynthesisError::Unavailable(
                "espeak-ng not found; install it or set ESPEAK_BIN".to_string(),
            )
        })?;

        debug!(target: "tts", engine = "espeak-ng", label = %request.text, rate = options.rate, "Generating label");
        let cmd = self.command(espeak, options.rate, &request.output_path);
        let run = run_cancellable(cmd, Some(request.text.as_bytes().to_vec()), &request.cancel);

        let result = match timeout(Duration::from_millis(self.cfg.timeout_ms), run).await {
            Err(_) => Err(SynthesisError::EngineFailed(format!(
                "espeak-ng timed out after {} ms",
                self.cfg.timeout_ms
            ))),
            Ok(Ok(out)) if out.success() => Ok(()),
            Ok(Ok(out)) => Err(SynthesisError::EngineFailed(format!(
                "espeak-ng failed: {}",
                out.stderr_tail(3)
            ))),
            Ok(Err(ProcessError::Cancelled)) => Err(SynthesisError::Cancelled),
            Ok(Err(e @ ProcessError::Spawn { .. })) => {
                Err(SynthesisError::Unavailable(e.to_string()))
            }
            Ok(Err(ProcessError::Io(source))) => Err(SynthesisError::Io(source)),
        };

        if matches!(result, Err(SynthesisError::Cancelled)) {
            if let Err(e) = tokio::fs::remove_file(&request.output_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(target: "tts", path = %request.output_path.display(), error = %e, "Failed to remove cancelled label file");
                }
            }
        }
        result
    }
}
