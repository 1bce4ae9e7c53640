//! ffmpeg / ffprobe integration tests.
//!
//! Real ffmpeg is not required: small shell scripts stand in for the binaries
//! so exit codes, argument passthrough and cancellation can be checked.

#![cfg(unix)]

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use voicechapter_core::media::{
    AudioProbe, ConcatError, Concatenator, EncodingHint, FfmpegConcatenator, FfprobeAudioProbe,
    CONCAT_FILTER,
};
use voicechapter_core::process::{run_cancellable, ProcessError};
use voicechapter_core::{
    BatchPipeline, CancellationToken, FileOutcome, LabelRequest, LabelSynthesizer,
    ProcessingOptions, RunOutcome, SynthesisError, ToolchainConfig, TtsProvider,
    VoiceChapterError,
};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake ffmpeg: records its arguments, writes "joined" to the last argument.
fn fake_ffmpeg(dir: &Path, exit_code: i32) -> (PathBuf, PathBuf) {
    let args_file = dir.join("ffmpeg_args.txt");
    let body = format!(
        r#"printf '%s\n' "$@" > '{args}'
for last; do :; done
printf 'joined' > "$last"
case "$*" in *broken*) echo "broken input" >&2; exit 1;; esac
exit {code}"#,
        args = args_file.display(),
        code = exit_code
    );
    (write_script(dir, "ffmpeg", &body), args_file)
}

fn recorded_args(args_file: &Path) -> Vec<String> {
    std::fs::read_to_string(args_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
    args.windows(2).any(|w| w[0] == flag && w[1] == value)
}

struct WritingSynth;

#[async_trait]
impl LabelSynthesizer for WritingSynth {
    fn provider(&self) -> TtsProvider {
        TtsProvider::SystemVoice
    }

    async fn generate_label(
        &self,
        _options: &ProcessingOptions,
        request: &LabelRequest,
    ) -> Result<(), SynthesisError> {
        tokio::fs::write(&request.output_path, b"RIFF").await?;
        Ok(())
    }
}

fn tools_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[tokio::test]
async fn test_concat_passes_codec_and_bitrate() {
    let tools = tools_dir();
    let (ffmpeg, args_file) = fake_ffmpeg(tools.path(), 0);
    let work = tools_dir();
    let output = work.path().join("a_labeled.mp3");
    let hint = EncodingHint {
        codec: Some("mp3".into()),
        bit_rate: Some(128_000),
    };

    FfmpegConcatenator::new(&ffmpeg)
        .concatenate(
            &work.path().join("a_label_temp.wav"),
            &work.path().join("a.mp3"),
            &output,
            &hint,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let args = recorded_args(&args_file);
    assert!(has_pair(&args, "-filter_complex", CONCAT_FILTER));
    assert!(has_pair(&args, "-map", "[a]"));
    assert!(has_pair(&args, "-c:a", "mp3"));
    assert!(has_pair(&args, "-b:a", "128000"));
    assert!(args.contains(&"-y".to_string()));
    assert_eq!(std::fs::read(&output).unwrap(), b"joined");
}

#[tokio::test]
async fn test_concat_nonzero_exit_is_per_file_failure() {
    let tools = tools_dir();
    let (ffmpeg, _) = fake_ffmpeg(tools.path(), 3);
    let work = tools_dir();
    let output = work.path().join("a_labeled.mp3");

    let err = FfmpegConcatenator::new(&ffmpeg)
        .concatenate(
            &work.path().join("a_label_temp.wav"),
            &work.path().join("a.mp3"),
            &output,
            &EncodingHint::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConcatError::Failed { code: Some(3), .. }));
    assert!(!err.is_fatal());
    // The half-written output is not left behind
    assert!(!output.exists());
}

#[tokio::test]
async fn test_concat_missing_binary_is_fatal() {
    let work = tools_dir();
    let err = FfmpegConcatenator::new(work.path().join("ffmpeg"))
        .concatenate(
            &work.path().join("a_label_temp.wav"),
            &work.path().join("a.mp3"),
            &work.path().join("a_labeled.mp3"),
            &EncodingHint::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConcatError::ToolUnavailable { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_concat_not_executable_is_fatal() {
    let tools = tools_dir();
    let ffmpeg = tools.path().join("ffmpeg");
    std::fs::write(&ffmpeg, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o644)).unwrap();

    let err = FfmpegConcatenator::new(&ffmpeg)
        .concatenate(
            Path::new("l.wav"),
            Path::new("o.mp3"),
            &tools.path().join("o_labeled.mp3"),
            &EncodingHint::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_fatal());
}

/// Executable bit set, but not a program the kernel can load.
fn unloadable_binary(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x7fELF\x02\x01\x01\0garbage").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_concat_unloadable_binary_is_fatal() {
    let tools = tools_dir();
    let ffmpeg = unloadable_binary(tools.path(), "ffmpeg");

    let err = FfmpegConcatenator::new(&ffmpeg)
        .concatenate(
            Path::new("l.wav"),
            Path::new("o.mp3"),
            &tools.path().join("o_labeled.mp3"),
            &EncodingHint::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, ConcatError::ToolUnavailable { .. }),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_pipeline_aborts_when_ffmpeg_cannot_start() {
    let tools = tools_dir();
    let ffmpeg = unloadable_binary(tools.path(), "ffmpeg");

    let music = tools_dir();
    for name in ["a.mp3", "b.mp3", "c.mp3"] {
        std::fs::write(music.path().join(name), b"audio").unwrap();
    }

    let options = ProcessingOptions::new(music.path()).with_ffmpeg(&ffmpeg);
    let err = BatchPipeline::new(Arc::new(WritingSynth), ToolchainConfig::default())
        .run(&options, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, VoiceChapterError::ToolUnavailable(_)),
        "unexpected error: {:?}",
        err
    );
    assert!(!music.path().join("a_labeled.mp3").exists());
    assert!(!music.path().join("a_label_temp.wav").exists());
}

#[tokio::test]
async fn test_cancellation_kills_running_ffmpeg() {
    let tools = tools_dir();
    let ffmpeg = write_script(tools.path(), "ffmpeg", "exec sleep 30");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = FfmpegConcatenator::new(&ffmpeg)
        .concatenate(
            Path::new("l.wav"),
            Path::new("o.mp3"),
            &tools.path().join("o_labeled.mp3"),
            &EncodingHint::default(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConcatError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_run_cancellable_feeds_stdin_and_captures_stdout() {
    let tools = tools_dir();
    let echo = write_script(tools.path(), "echo-stdin", "cat; echo done >&2");

    let out = run_cancellable(
        tokio::process::Command::new(&echo),
        Some(b"Chapter one".to_vec()),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(out.success());
    assert_eq!(out.stdout, b"Chapter one");
    assert_eq!(out.stderr_tail(1), "done");
}

#[tokio::test]
async fn test_run_cancellable_refuses_when_already_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = run_cancellable(tokio::process::Command::new("true"), None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Cancelled));
}

#[tokio::test]
async fn test_ffprobe_json_becomes_hint() {
    let tools = tools_dir();
    let ffprobe = write_script(
        tools.path(),
        "ffprobe",
        r#"echo '{"streams":[{"index":0,"codec_name":"vorbis","bit_rate":"112000"}]}'"#,
    );

    let hint = FfprobeAudioProbe::new(Some(ffprobe), CancellationToken::new())
        .probe(Path::new("a.ogg"))
        .await;

    assert_eq!(hint.codec.as_deref(), Some("vorbis"));
    assert_eq!(hint.bit_rate, Some(112_000));
}

#[tokio::test]
async fn test_ffprobe_failure_degrades_to_empty_hint() {
    let tools = tools_dir();
    let ffprobe = write_script(
        tools.path(),
        "ffprobe",
        "echo 'a.ogg: Invalid data found when processing input' >&2; exit 1",
    );

    let hint = FfprobeAudioProbe::new(Some(ffprobe), CancellationToken::new())
        .probe(Path::new("a.ogg"))
        .await;

    assert!(hint.is_empty());
}

#[tokio::test]
async fn test_pipeline_end_to_end_with_fake_tools() {
    let tools = tools_dir();
    let (ffmpeg, _) = fake_ffmpeg(tools.path(), 0);
    write_script(
        tools.path(),
        "ffprobe",
        r#"echo '{"streams":[{"codec_name":"mp3","bit_rate":"64000"}]}'"#,
    );

    let music = tools_dir();
    for name in ["01 intro.mp3", "02 broken.mp3", "03 outro.mp3"] {
        std::fs::write(music.path().join(name), b"audio").unwrap();
    }

    let options = ProcessingOptions::new(music.path()).with_ffmpeg(&ffmpeg);
    let outcome = BatchPipeline::new(Arc::new(WritingSynth), ToolchainConfig::default())
        .run(&options, &CancellationToken::new())
        .await
        .unwrap();

    let summary = match outcome {
        RunOutcome::Completed(s) => s,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(summary.hint.bit_rate, Some(64_000));
    assert_eq!(summary.succeeded(), 2);
    assert!(matches!(
        summary.outcome_of(&music.path().join("02 broken.mp3")),
        Some(FileOutcome::Failed { .. })
    ));
    assert!(music.path().join("01 intro_labeled.mp3").exists());
    assert!(!music.path().join("02 broken_labeled.mp3").exists());
    assert!(music.path().join("03 outro_labeled.mp3").exists());

    let leftovers = std::fs::read_dir(music.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .contains("_label_temp.")
        })
        .count();
    assert_eq!(leftovers, 0);
}
