//! Neural voice labels via Piper.
//!
//! The engine needs a one-time setup per process (binary + voice model, see
//! [`crate::provision`]). That setup lives in [`NeuralEngineState`]: a
//! presence check on the stored session, filled at most once.
//!
//! Piper runs with `--output_raw`; the PCM it prints is collected in memory,
//! wrapped into a WAV buffer and written to the label path in one go.

use crate::provision::{EngineProvisioner, PiperProvisioner, PiperSession};
use crate::rate::neural_length_scale;
use crate::wav::{encode_pcm16_mono, write_whole_file};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use voicechapter_core::process::{run_cancellable, ProcessError};
use voicechapter_core::{
    LabelRequest, LabelSynthesizer, ProcessingOptions, SynthesisError, TtsProvider,
};

/// Initialize-once holder of the Piper session.
#[derive(Default)]
pub struct NeuralEngineState {
    session: OnceCell<PiperSession>,
    initializations: AtomicUsize,
}

impl NeuralEngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.session.initialized()
    }

    /// Number of setups that actually ran (successful or not).
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<&PiperSession> {
        self.session.get()
    }

    /// Return the session, running `provisioner` only if none exists yet.
    pub async fn get_or_initialize(
        &self,
        model_key: &str,
        provisioner: &dyn EngineProvisioner,
    ) -> Result<&PiperSession, SynthesisError> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }
        self.session
            .get_or_try_init(|| async {
                self.initializations.fetch_add(1, Ordering::SeqCst);
                info!(target: "tts", engine = "piper", model = %model_key, "Initializing neural voice");
                provisioner.provision(model_key).await
            })
            .await
    }
}

pub struct NeuralSynthesizer {
    state: NeuralEngineState,
    provisioner: Arc<dyn EngineProvisioner>,
    timeout_ms: u64,
}

impl NeuralSynthesizer {
    pub fn new(provisioner: Arc<dyn EngineProvisioner>, timeout_ms: u64) -> Self {
        Self {
            state: NeuralEngineState::new(),
            provisioner,
            timeout_ms,
        }
    }

    pub fn with_piper(provisioner: PiperProvisioner) -> Self {
        let timeout_ms = provisioner.config().timeout_ms;
        Self::new(Arc::new(provisioner), timeout_ms)
    }

    pub fn state(&self) -> &NeuralEngineState {
        &self.state
    }

    async fn infer(
        &self,
        session: &PiperSession,
        request: &LabelRequest,
        length_scale: f32,
    ) -> Result<Vec<u8>, SynthesisError> {
        let mut cmd = Command::new(&session.piper_bin);
        cmd.arg("--model")
            .arg(&session.model_path)
            .arg("--config")
            .arg(&session.config_path)
            .arg("--output_raw")
            .arg("--length_scale")
            .arg(format!("{:.3}", length_scale));

        let mut text = request.text.clone().into_bytes();
        text.push(b'\n');
        let run = run_cancellable(cmd, Some(text), &request.cancel);

        match timeout(Duration::from_millis(self.timeout_ms), run).await {
            Err(_) => Err(SynthesisError::EngineFailed(format!(
                "piper timed out after {} ms",
                self.timeout_ms
            ))),
            Ok(Ok(out)) if out.success() && !out.stdout.is_empty() => Ok(out.stdout),
            Ok(Ok(out)) if out.success() => Err(SynthesisError::EngineFailed(
                "piper produced no audio".to_string(),
            )),
            Ok(Ok(out)) => Err(SynthesisError::EngineFailed(format!(
                "piper failed: {}",
                out.stderr_tail(3)
            ))),
            Ok(Err(ProcessError::Cancelled)) => Err(SynthesisError::Cancelled),
            Ok(Err(e @ ProcessError::Spawn { .. })) => {
                Err(SynthesisError::Unavailable(e.to_string()))
            }
            Ok(Err(ProcessError::Io(source))) => Err(SynthesisError::Io(source)),
        }
    }
}

#[async_trait]
impl LabelSynthesizer for NeuralSynthesizer {
    fn provider(&self) -> TtsProvider {
        TtsProvider::NeuralModel
    }

    async fn generate_label(
        &self,
        options: &ProcessingOptions,
        request: &LabelRequest,
    ) -> Result<(), SynthesisError> {
        if request.cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        let model_key = options.effective_model_key();
        let session = self
            .state
            .get_or_initialize(model_key, self.provisioner.as_ref())
            .await?;
        if session.model_key != model_key {
            warn!(target: "tts", loaded = %session.model_key, requested = %model_key, "Neural voice already initialized with another model; keeping it");
        }

        let length_scale = neural_length_scale(options.rate);
        debug!(target: "tts", engine = "piper", label = %request.text, length_scale, "Generating label");

        let pcm = self.infer(session, request, length_scale).await?;
        let wav = encode_pcm16_mono(&pcm, session.sample_rate)
            .map_err(|e| SynthesisError::EngineFailed(format!("WAV encoding failed: {}", e)))?;
        write_whole_file(&request.output_path, &wav, &request.cancel).await
    }
}
