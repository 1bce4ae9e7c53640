//! Eligible file discovery and per-file path derivation.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions (without dot) the batch picks up, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "flac", "m4a", "ogg", "aac"];

const LABEL_TEMP_SUFFIX: &str = "_label_temp";
const LABELED_SUFFIX: &str = "_labeled";
/// Synthesizers always write WAV, whatever the source format, so the temp
/// label is `<base>_label_temp.wav` rather than carrying the source extension
/// (the desktop tool this replaces names it the same way).
const LABEL_EXTENSION: &str = "wav";

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Supported files directly inside `folder`, sorted by full path.
pub async fn enumerate_audio_files(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            continue;
        }
        if is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Paths derived from one source file. Computed on the fly, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFileDescriptor {
    pub path: PathBuf,
    /// File name without extension
    pub base_name: String,
    pub dir: PathBuf,
    /// Extension without the dot, original case kept
    pub extension: String,
}

impl AudioFileDescriptor {
    pub fn from_path(path: &Path) -> Option<Self> {
        let base_name = path.file_stem()?.to_string_lossy().to_string();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Some(Self {
            path: path.to_path_buf(),
            base_name,
            dir,
            extension,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.base_name.clone())
    }

    /// `<dir>/<base>_label_temp.wav`, removed once the file is processed.
    pub fn label_temp_path(&self) -> PathBuf {
        self.sibling(LABEL_TEMP_SUFFIX, LABEL_EXTENSION)
    }

    /// `<dir>/<base>_labeled.<ext>`
    pub fn labeled_output_path(&self) -> PathBuf {
        self.sibling(LABELED_SUFFIX, &self.extension)
    }

    fn sibling(&self, suffix: &str, extension: &str) -> PathBuf {
        if extension.is_empty() {
            self.dir.join(format!("{}{}", self.base_name, suffix))
        } else {
            self.dir
                .join(format!("{}{}.{}", self.base_name, suffix, extension))
        }
    }
}
