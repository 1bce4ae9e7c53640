//! Per-run processing options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Piper voice used when no model key is configured.
pub const DEFAULT_MODEL_KEY: &str = "en_GB-alan-medium";

/// Which engine speaks the labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsProvider {
    /// Locally installed platform voice (espeak-ng)
    #[default]
    SystemVoice,
    /// Neural voice model (Piper)
    NeuralModel,
}

impl TtsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsProvider::SystemVoice => "system-voice",
            TtsProvider::NeuralModel => "neural-model",
        }
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtsProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speech" | "system" | "system-voice" | "espeak" | "espeak-ng" => {
                Ok(TtsProvider::SystemVoice)
            }
            "piper" | "neural" | "neural-model" => Ok(TtsProvider::NeuralModel),
            other => Err(format!(
                "unknown TTS provider '{}' (expected system-voice or neural-model)",
                other
            )),
        }
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Folder whose audio files get labelled (not recursive)
    pub folder: PathBuf,
    /// Explicit ffmpeg executable or the folder holding it; `None` auto-provisions
    pub ffmpeg_path_or_folder: Option<PathBuf>,
    pub provider: TtsProvider,
    /// Piper voice key, only used by the neural provider
    pub model_key: String,
    /// Transliterate the spoken label text (never the output file name)
    pub transliterate: bool,
    /// Signed speaking rate, 0 is normal speed
    pub rate: i32,
}

impl ProcessingOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ffmpeg_path_or_folder: None,
            provider: TtsProvider::default(),
            model_key: DEFAULT_MODEL_KEY.to_string(),
            transliterate: false,
            rate: 0,
        }
    }

    pub fn with_ffmpeg(mut self, path_or_folder: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path_or_folder = Some(path_or_folder.into());
        self
    }

    pub fn with_provider(mut self, provider: TtsProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = key.into();
        self
    }

    pub fn with_transliteration(mut self, enabled: bool) -> Self {
        self.transliterate = enabled;
        self
    }

    pub fn with_rate(mut self, rate: i32) -> Self {
        self.rate = rate;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Model key with blank values falling back to [`DEFAULT_MODEL_KEY`].
    pub fn effective_model_key(&self) -> &str {
        if self.model_key.trim().is_empty() {
            DEFAULT_MODEL_KEY
        } else {
            self.model_key.trim()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parses_aliases() {
        assert_eq!("speech".parse::<TtsProvider>(), Ok(TtsProvider::SystemVoice));
        assert_eq!("Piper".parse::<TtsProvider>(), Ok(TtsProvider::NeuralModel));
        assert_eq!(
            " neural-model ".parse::<TtsProvider>(),
            Ok(TtsProvider::NeuralModel)
        );
        assert!("sapi5".parse::<TtsProvider>().is_err());
    }

    #[test]
    fn test_blank_model_key_falls_back() {
        let opts = ProcessingOptions::new("/music").with_model_key("  ");
        assert_eq!(opts.effective_model_key(), DEFAULT_MODEL_KEY);

        let opts = opts.with_model_key("ru_RU-irina-medium");
        assert_eq!(opts.effective_model_key(), "ru_RU-irina-medium");
    }

    #[test]
    fn test_defaults() {
        let opts = ProcessingOptions::new("/music");
        assert_eq!(opts.provider, TtsProvider::SystemVoice);
        assert_eq!(opts.rate, 0);
        assert!(!opts.transliterate);
        assert!(opts.ffmpeg_path_or_folder.is_none());
    }
}
