use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use voicechapter_core::{ProcessingOptions, TtsProvider, VoiceChapterError, DEFAULT_MODEL_KEY};
use voicechapter_tts::TtsConfig;

/// Command line; every flag overrides env and TOML values.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Prepend the spoken file name to every audio file of a folder")]
pub struct Cli {
    /// Folder with the audio files
    #[arg(value_name = "FOLDER")]
    pub folder_arg: Option<PathBuf>,

    /// Folder with the audio files (same as the positional argument)
    #[arg(short, long, conflicts_with = "folder_arg")]
    pub folder: Option<PathBuf>,

    /// ffmpeg executable or the folder containing it
    #[arg(short = 'e', long)]
    pub ffmpeg: Option<PathBuf>,

    /// Label voice: system-voice or neural-model
    #[arg(short, long)]
    pub provider: Option<TtsProvider>,

    /// Neural voice model key, e.g. en_GB-alan-medium
    #[arg(short, long)]
    pub model_key: Option<String>,

    /// Transliterate label text to Latin script
    #[arg(short, long)]
    pub translit: bool,

    /// Speaking rate, 0 is normal, negative is slower
    #[arg(short, long, allow_hyphen_values = true)]
    pub rate: Option<i32>,
}

/// Full configuration of one invocation.
#[derive(Clone, Debug)]
pub struct VoiceChapterConfig {
    pub folder: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub provider: TtsProvider,
    pub model_key: String,
    pub transliterate: bool,
    pub rate: i32,
    pub tts: TtsConfig,
}

impl Default for VoiceChapterConfig {
    fn default() -> Self {
        Self {
            folder: None,
            ffmpeg: None,
            provider: TtsProvider::default(),
            model_key: DEFAULT_MODEL_KEY.to_string(),
            transliterate: false,
            rate: 0,
            tts: TtsConfig::default(),
        }
    }
}

impl VoiceChapterConfig {
    /// Defaults, then VOICECHAPTER_* env vars, then the TOML file
    /// (path via VOICECHAPTER_CONFIG or ./voicechapter.toml).
    pub fn load() -> Self {
        let base = Self::default().with_env(|key| std::env::var(key).ok());
        let path =
            std::env::var("VOICECHAPTER_CONFIG").unwrap_or_else(|_| "voicechapter.toml".into());
        Self::overlay_file(base, Path::new(&path))
    }

    fn overlay_file(base: Self, path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(target: "voicechapter", path = %path.display(), "No TOML config found; using defaults/env");
            return base;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<VoiceChapterToml>(&s) {
                Ok(t) => {
                    tracing::info!(target: "voicechapter", path = %path.display(), "Loaded TOML config");
                    t.overlay(base)
                }
                Err(e) => {
                    tracing::warn!(target: "voicechapter", error = %e, "Failed to parse TOML; ignoring it");
                    base
                }
            },
            Err(e) => {
                tracing::warn!(target: "voicechapter", error = %e, "Failed to read TOML; ignoring it");
                base
            }
        }
    }

    /// Apply VOICECHAPTER_* variables read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("VOICECHAPTER_FOLDER") {
            self.folder = Some(PathBuf::from(v));
        }
        if let Some(v) = var("VOICECHAPTER_FFMPEG") {
            self.ffmpeg = Some(PathBuf::from(v));
        }
        if let Some(v) = var("VOICECHAPTER_PROVIDER") {
            match v.parse() {
                Ok(p) => self.provider = p,
                Err(e) => tracing::warn!(target: "voicechapter", error = %e, "Ignoring VOICECHAPTER_PROVIDER"),
            }
        }
        if let Some(v) = var("VOICECHAPTER_MODEL") {
            self.model_key = v;
        }
        if let Some(v) = var("VOICECHAPTER_RATE") {
            match v.trim().parse::<i32>() {
                Ok(r) => self.rate = r,
                Err(e) => tracing::warn!(target: "voicechapter", error = %e, value = %v, "Ignoring VOICECHAPTER_RATE"),
            }
        }
        if let Some(v) = var("VOICECHAPTER_TRANSLIT") {
            self.transliterate = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }

    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(folder) = cli.folder_arg.or(cli.folder) {
            self.folder = Some(folder);
        }
        if let Some(ffmpeg) = cli.ffmpeg {
            self.ffmpeg = Some(ffmpeg);
        }
        if let Some(provider) = cli.provider {
            self.provider = provider;
        }
        if let Some(key) = cli.model_key {
            self.model_key = key;
        }
        if cli.translit {
            self.transliterate = true;
        }
        if let Some(rate) = cli.rate {
            self.rate = rate;
        }
        self
    }

    pub fn processing_options(&self) -> Result<ProcessingOptions, VoiceChapterError> {
        let folder = self.folder.clone().ok_or_else(|| {
            VoiceChapterError::Config(
                "no folder given; pass it as an argument or set VOICECHAPTER_FOLDER".to_string(),
            )
        })?;
        let mut options = ProcessingOptions::new(folder)
            .with_provider(self.provider)
            .with_model_key(self.model_key.clone())
            .with_transliteration(self.transliterate)
            .with_rate(self.rate);
        if let Some(ffmpeg) = &self.ffmpeg {
            options = options.with_ffmpeg(ffmpeg.clone());
        }
        Ok(options)
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct VoiceChapterToml {
    pub folder: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub provider: Option<TtsProvider>,
    pub model_key: Option<String>,
    pub transliterate: Option<bool>,
    pub rate: Option<i32>,
    pub system_voice: Option<SystemVoiceToml>,
    pub neural: Option<NeuralToml>,
}

impl VoiceChapterToml {
    fn overlay(self, mut base: VoiceChapterConfig) -> VoiceChapterConfig {
        if let Some(v) = self.folder {
            base.folder = Some(v);
        }
        if let Some(v) = self.ffmpeg {
            base.ffmpeg = Some(v);
        }
        if let Some(v) = self.provider {
            base.provider = v;
        }
        if let Some(v) = self.model_key {
            base.model_key = v;
        }
        if let Some(v) = self.transliterate {
            base.transliterate = v;
        }
        if let Some(v) = self.rate {
            base.rate = v;
        }
        if let Some(s) = self.system_voice {
            s.apply(&mut base.tts);
        }
        if let Some(n) = self.neural {
            n.apply(&mut base.tts);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SystemVoiceToml {
    pub espeak_bin: Option<PathBuf>,
    pub voice: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl SystemVoiceToml {
    fn apply(self, tts: &mut TtsConfig) {
        if let Some(v) = self.espeak_bin {
            tts.system.espeak_bin = Some(v);
        }
        if let Some(v) = self.voice {
            tts.system.voice = Some(v);
        }
        if let Some(v) = self.timeout_ms {
            tts.system.timeout_ms = v;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NeuralToml {
    pub piper_bin: Option<PathBuf>,
    pub piper_dir: Option<PathBuf>,
    pub voice_dir: Option<PathBuf>,
    pub voice_base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl NeuralToml {
    fn apply(self, tts: &mut TtsConfig) {
        if let Some(v) = self.piper_bin {
            tts.neural.piper_bin = Some(v);
        }
        if let Some(v) = self.piper_dir {
            tts.neural.piper_dir = v;
        }
        if let Some(v) = self.voice_dir {
            tts.neural.voice_dir = v;
        }
        if let Some(v) = self.voice_base_url {
            tts.neural.voice_base_url = v;
        }
        if let Some(v) = self.timeout_ms {
            tts.neural.timeout_ms = v;
        }
    }
}
