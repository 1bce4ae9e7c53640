//! In-memory WAV encoding and whole-file label writes.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use voicechapter_core::SynthesisError;

/// Wrap raw little-endian 16-bit mono PCM into a complete WAV buffer.
pub fn encode_pcm16_mono(raw: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(raw.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for pair in raw.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Write `bytes` to `path` as a whole: staged in `<path>.partial`, then renamed
/// over `path`. A cancelled or failed write leaves neither file behind.
pub async fn write_whole_file(
    path: &Path,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<(), SynthesisError> {
    if cancel.is_cancelled() {
        return Err(SynthesisError::Cancelled);
    }
    let staging = partial_path(path);

    // Runs on a blocking thread; always awaited so cleanup comes after it.
    let result = match tokio::fs::write(&staging, bytes).await {
        Ok(()) if cancel.is_cancelled() => Err(SynthesisError::Cancelled),
        Ok(()) => tokio::fs::rename(&staging, path)
            .await
            .map_err(SynthesisError::Io),
        Err(e) => Err(SynthesisError::Io(e)),
    };

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(target: "tts", path = %staging.display(), error = %e, "Failed to remove partial label file");
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_roundtrips_samples() {
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let raw: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let wav = encode_pcm16_mono(&raw, 22_050).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 22_050);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_odd_trailing_byte_ignored() {
        let wav = encode_pcm16_mono(&[1, 0, 7], 16_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 1);
    }

    #[tokio::test]
    async fn test_whole_file_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a_label_temp.wav");
        std::fs::write(&out, b"old").unwrap();

        write_whole_file(&out, b"new label", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"new label");
        assert!(!partial_path(&out).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = vec![0u8; 4 * 1024 * 1024];

        for round in 0..8u64 {
            let out = dir.path().join(format!("t{}_label_temp.wav", round));
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            let canceller = tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_micros(round * 250)).await;
                trigger.cancel();
            });

            let result = write_whole_file(&out, &bytes, &cancel).await;
            canceller.await.unwrap();

            assert!(!partial_path(&out).exists(), "round {}", round);
            match result {
                Ok(()) => assert_eq!(std::fs::metadata(&out).unwrap().len(), bytes.len() as u64),
                Err(SynthesisError::Cancelled) => assert!(!out.exists()),
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a_label_temp.wav");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = write_whole_file(&out, b"label", &cancel).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled));
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }
}
