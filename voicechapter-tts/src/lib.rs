// Label voices for VoiceChapter

// Shared binary lookup
pub(crate) mod utils;

pub mod neural;
pub mod provision;
pub mod rate;
pub mod system_voice;
pub mod wav;

pub use neural::{NeuralEngineState, NeuralSynthesizer};
pub use provision::{EngineProvisioner, NeuralVoiceConfig, PiperProvisioner, PiperSession};
pub use system_voice::{SystemVoiceConfig, SystemVoiceSynthesizer};

use std::sync::Arc;
use tracing::info;
use voicechapter_core::{LabelSynthesizer, TtsProvider};

/// Engine settings for both providers; only the selected one is used.
#[derive(Clone, Debug, Default)]
pub struct TtsConfig {
    pub system: SystemVoiceConfig,
    pub neural: NeuralVoiceConfig,
}

/// Pick the label engine once, before any file is processed.
pub fn build_synthesizer(provider: TtsProvider, cfg: TtsConfig) -> Arc<dyn LabelSynthesizer> {
    info!(target: "tts", provider = %provider, "Selected label voice");
    match provider {
        TtsProvider::SystemVoice => Arc::new(SystemVoiceSynthesizer::new(cfg.system)),
        TtsProvider::NeuralModel => {
            Arc::new(NeuralSynthesizer::with_piper(PiperProvisioner::new(cfg.neural)))
        }
    }
}
