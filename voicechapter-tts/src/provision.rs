//! Piper engine provisioning: binary lookup and voice model download.
//!
//! Voice models are stored as `<voice_dir>/<key>/<key>.onnx` plus the
//! matching `.onnx.json`, and fetched from the piper-voices repository when
//! absent.
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_DIR (managed Piper install)
//! - PIPER_VOICE_DIR, PIPER_VOICE_BASE_URL
//! - TTS_TIMEOUT_MS

use crate::utils::{
    beside_executable, env_path, executable_in, get_from_env_or_path, timeout_ms_from_env,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{debug, info, warn};
use voicechapter_core::SynthesisError;

pub const DEFAULT_VOICE_BASE_URL: &str =
    "https://huggingface.co/rhasspy/piper-voices/resolve/main";

#[derive(Clone, Debug)]
pub struct NeuralVoiceConfig {
    pub piper_bin: Option<PathBuf>,
    /// Managed Piper install folder, searched when `piper_bin` is unset
    pub piper_dir: PathBuf,
    pub voice_dir: PathBuf,
    pub voice_base_url: String,
    pub timeout_ms: u64,
    pub download_timeout_ms: u64,
}

impl Default for NeuralVoiceConfig {
    fn default() -> Self {
        let piper_dir = env_path("PIPER_DIR").unwrap_or_else(|| beside_executable("piper"));
        let voice_dir = env_path("PIPER_VOICE_DIR").unwrap_or_else(|| piper_dir.join("models"));
        let voice_base_url = std::env::var("PIPER_VOICE_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_VOICE_BASE_URL.to_string());
        Self {
            piper_bin: get_from_env_or_path("PIPER_BIN", "piper"),
            piper_dir,
            voice_dir,
            voice_base_url,
            timeout_ms: timeout_ms_from_env(),
            download_timeout_ms: 300_000,
        }
    }
}

/// Everything needed to run one inference.
#[derive(Clone, Debug, PartialEq)]
pub struct PiperSession {
    pub model_key: String,
    pub piper_bin: PathBuf,
    pub model_path: PathBuf,
    pub config_path: PathBuf,
    pub sample_rate: u32,
}

/// One-time engine setup, behind a trait so the init-once state can be tested
/// without a network.
#[async_trait]
pub trait EngineProvisioner: Send + Sync {
    async fn provision(&self, model_key: &str) -> Result<PiperSession, SynthesisError>;
}

/// Parts of a voice key such as `en_GB-alan-medium`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceKey<'a> {
    pub language: &'a str,
    pub locale: &'a str,
    pub name: &'a str,
    pub quality: &'a str,
}

impl<'a> VoiceKey<'a> {
    pub fn parse(key: &'a str) -> Option<Self> {
        let (locale, rest) = key.split_once('-')?;
        let (name, quality) = rest.rsplit_once('-')?;
        let (language, _) = locale.split_once('_')?;
        if [language, name, quality].iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            language,
            locale,
            name,
            quality,
        })
    }

    /// Download URL of `<key><suffix>` under `base`.
    pub fn url(&self, base: &str, suffix: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}-{}-{}{}",
            base.trim_end_matches('/'),
            self.language,
            self.locale,
            self.name,
            self.quality,
            self.locale,
            self.name,
            self.quality,
            suffix
        )
    }
}

#[derive(Debug, Deserialize)]
struct VoiceModelConfig {
    audio: Option<VoiceAudioConfig>,
}

#[derive(Debug, Deserialize)]
struct VoiceAudioConfig {
    sample_rate: Option<u32>,
}

const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Reads `audio.sample_rate` from a Piper `.onnx.json`.
pub fn read_sample_rate(config_json: &[u8]) -> Result<u32, serde_json::Error> {
    let cfg: VoiceModelConfig = serde_json::from_slice(config_json)?;
    Ok(cfg
        .audio
        .and_then(|a| a.sample_rate)
        .filter(|r| *r > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE))
}

pub struct PiperProvisioner {
    cfg: NeuralVoiceConfig,
    http_client: reqwest::Client,
}

impl PiperProvisioner {
    pub fn new(cfg: NeuralVoiceConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.download_timeout_ms))
            .user_agent(concat!("voicechapter/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { cfg, http_client }
    }

    pub fn config(&self) -> &NeuralVoiceConfig {
        &self.cfg
    }

    fn resolve_binary(&self) -> Result<PathBuf, SynthesisError> {
        if let Some(bin) = &self.cfg.piper_bin {
            return Ok(bin.clone());
        }
        if let Some(bin) = executable_in(&self.cfg.piper_dir, "piper") {
            return Ok(bin);
        }
        Err(SynthesisError::Unavailable(format!(
            "Piper binary not found; install piper, set PIPER_BIN, or place it in '{}'",
            self.cfg.piper_dir.display()
        )))
    }

    async fn resolve_model(&self, model_key: &str) -> Result<(PathBuf, PathBuf), SynthesisError> {
        let dir = self.cfg.voice_dir.join(model_key);
        let model_path = dir.join(format!("{}.onnx", model_key));
        let config_path = dir.join(format!("{}.onnx.json", model_key));

        if model_path.is_file() && config_path.is_file() {
            info!(target: "tts", path = %dir.display(), "Found existing voice model");
            return Ok((model_path, config_path));
        }

        let key = VoiceKey::parse(model_key).ok_or_else(|| {
            SynthesisError::Unavailable(format!(
                "voice model '{}' is not installed and is not a valid voice key (expected e.g. en_GB-alan-medium)",
                model_key
            ))
        })?;

        info!(target: "tts", model = %model_key, "Downloading voice model");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| install_error(&dir, e))?;
        self.download(&key.url(&self.cfg.voice_base_url, ".onnx.json"), &config_path)
            .await?;
        self.download(&key.url(&self.cfg.voice_base_url, ".onnx"), &model_path)
            .await?;
        Ok((model_path, config_path))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), SynthesisError> {
        debug!(target: "tts", url = %url, "Fetching");
        let response = self.http_client.get(url).send().await.map_err(|e| {
            warn!(target: "tts", error = %e, url = %url, "Voice download request failed");
            SynthesisError::Download(format!("request to {} failed: {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(target: "tts", status = %status, url = %url, "Voice download returned error");
            return Err(SynthesisError::Download(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            SynthesisError::Download(format!("reading {} failed: {}", url, e))
        })?;

        store_download(dest, &bytes).await
    }
}

/// Write `bytes` to `<dest>.download`, then rename it over `dest`. A failed
/// store leaves no staging file behind.
async fn store_download(dest: &Path, bytes: &[u8]) -> Result<(), SynthesisError> {
    let mut staging = dest.as_os_str().to_owned();
    staging.push(".download");
    let staging = PathBuf::from(staging);
    let stored = match tokio::fs::write(&staging, bytes).await {
        Ok(()) => tokio::fs::rename(&staging, dest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        if let Err(rm) = tokio::fs::remove_file(&staging).await {
            if rm.kind() != std::io::ErrorKind::NotFound {
                debug!(target: "tts", path = %staging.display(), error = %rm, "Failed to remove partial download");
            }
        }
        return Err(install_error(dest, e));
    }
    Ok(())
}

/// IO failure while installing the voice; the engine is unusable afterwards.
fn install_error(path: &Path, e: std::io::Error) -> SynthesisError {
    SynthesisError::Unavailable(format!(
        "cannot install voice model into '{}': {}",
        path.display(),
        e
    ))
}

#[async_trait]
impl EngineProvisioner for PiperProvisioner {
    async fn provision(&self, model_key: &str) -> Result<PiperSession, SynthesisError> {
        let piper_bin = self.resolve_binary()?;
        info!(target: "tts", bin = ?piper_bin, "Detected Piper binary");

        let (model_path, config_path) = self.resolve_model(model_key).await?;
        let config_json = tokio::fs::read(&config_path)
            .await
            .map_err(|e| install_error(&config_path, e))?;
        let sample_rate = read_sample_rate(&config_json).map_err(|e| {
            SynthesisError::Unavailable(format!(
                "voice config '{}' is unreadable: {}",
                config_path.display(),
                e
            ))
        })?;

        Ok(PiperSession {
            model_key: model_key.to_string(),
            piper_bin,
            model_path,
            config_path,
            sample_rate,
        })
    }
}
