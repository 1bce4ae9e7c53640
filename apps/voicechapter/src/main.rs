mod config;
use clap::Parser;
use config::{Cli, VoiceChapterConfig};
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};
use voicechapter_core::{
    BatchPipeline, CancellationToken, FileOutcome, RunOutcome, RunSummary, ToolchainConfig,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,voicechapter=info,voicechapter_core=info,voicechapter_tts=info".to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Defaults + env + optional TOML overlay, then command line
    let cfg = VoiceChapterConfig::load().with_cli(cli);
    let options = match cfg.processing_options() {
        Ok(o) => o,
        Err(e) => {
            error!(target: "voicechapter", error = %e, "Invalid configuration");
            return ExitCode::from(1);
        }
    };

    // Ctrl+C stops the batch after killing the running tool
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!(target: "voicechapter", "Interrupt received; cancelling");
                cancel.cancel();
            }
        });
    }

    let synthesizer = voicechapter_tts::build_synthesizer(options.provider, cfg.tts.clone());
    let pipeline = BatchPipeline::new(synthesizer, ToolchainConfig::from_env());

    match pipeline.run(&options, &cancel).await {
        Ok(RunOutcome::NothingToDo) => {
            info!(target: "voicechapter", folder = %options.folder.display(), "No supported audio files found");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed(summary)) => {
            report(&summary);
            if summary.failed() > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Ok(RunOutcome::Cancelled(summary)) => {
            report(&summary);
            warn!(target: "voicechapter", not_started = summary.not_started, "Processing cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            error!(target: "voicechapter", error = %e, "Processing aborted");
            ExitCode::from(1)
        }
    }
}

fn report(summary: &RunSummary) {
    for (path, outcome) in &summary.files {
        match outcome {
            FileOutcome::Labeled { output } => {
                info!(target: "voicechapter", file = %path.display(), output = %output.display(), "Labeled")
            }
            FileOutcome::Failed { stage, message } => {
                warn!(target: "voicechapter", file = %path.display(), stage = %stage, error = %message, "Failed")
            }
            FileOutcome::Cancelled => {
                warn!(target: "voicechapter", file = %path.display(), "Cancelled")
            }
        }
    }
    info!(
        target: "voicechapter",
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "Done"
    );
}
