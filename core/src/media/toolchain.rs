//! Locating the ffmpeg/ffprobe binaries for a run.
//!
//! Resolution order:
//! - explicit executable path: used as ffmpeg, ffprobe looked up beside it
//! - explicit folder: `ffmpeg[.exe]` / `ffprobe[.exe]` inside it
//! - nothing given: managed folder (`FFMPEG_BINARY_DIR`, default
//!   `<executable dir>/ffmpeg-binaries`), then `FFMPEG_BIN`, then `PATH`
//!
//! Every failure here is fatal: it happens before any file is touched.

use crate::{Result, VoiceChapterError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MANAGED_FOLDER_NAME: &str = "ffmpeg-binaries";

#[derive(Clone, Debug, Default)]
pub struct ToolchainConfig {
    /// Folder the auto-provision path looks into first
    pub managed_dir: Option<PathBuf>,
    /// Explicit ffmpeg override from the environment
    pub ffmpeg_bin: Option<PathBuf>,
    /// Search `PATH` when nothing else resolved
    pub search_path: bool,
}

impl ToolchainConfig {
    /// Defaults with env overrides (`FFMPEG_BINARY_DIR`, `FFMPEG_BIN`).
    pub fn from_env() -> Self {
        let managed_dir = std::env::var("FFMPEG_BINARY_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|p| p.join(MANAGED_FOLDER_NAME)))
            });
        let ffmpeg_bin = std::env::var("FFMPEG_BIN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self {
            managed_dir,
            ffmpeg_bin,
            search_path: true,
        }
    }
}

/// Resolved binary locations, threaded into the probe and concatenator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    /// `None` when no ffprobe sits next to ffmpeg; probing then degrades
    pub ffprobe: Option<PathBuf>,
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe,
        }
    }

    /// Resolve from the user-supplied path-or-folder, or auto-provision when absent.
    pub fn resolve(explicit: Option<&Path>, cfg: &ToolchainConfig) -> Result<Self> {
        match explicit {
            Some(p) if p.as_os_str().is_empty() => Self::auto_provision(cfg),
            Some(p) if p.is_file() => {
                let ffprobe = p.parent().and_then(|dir| find_in_dir(dir, "ffprobe"));
                info!(target: "toolchain", path = %p.display(), "Using ffmpeg binaries from explicit file");
                Ok(Self::new(p, ffprobe))
            }
            Some(p) if p.is_dir() => {
                let ffmpeg = find_in_dir(p, "ffmpeg").ok_or_else(|| {
                    VoiceChapterError::ToolchainUnresolved(format!(
                        "no ffmpeg executable inside folder '{}'",
                        p.display()
                    ))
                })?;
                info!(target: "toolchain", folder = %p.display(), "Using ffmpeg binaries from folder");
                Ok(Self::new(ffmpeg, find_in_dir(p, "ffprobe")))
            }
            Some(p) => Err(VoiceChapterError::ToolchainUnresolved(format!(
                "ffmpeg path or folder not found: '{}'",
                p.display()
            ))),
            None => Self::auto_provision(cfg),
        }
    }

    fn auto_provision(cfg: &ToolchainConfig) -> Result<Self> {
        info!(target: "toolchain", "No ffmpeg path provided; looking for managed or installed binaries");

        if let Some(dir) = &cfg.managed_dir {
            if let Some(ffmpeg) = find_in_dir(dir, "ffmpeg") {
                info!(target: "toolchain", folder = %dir.display(), "Using managed ffmpeg binaries");
                return Ok(Self::new(ffmpeg, find_in_dir(dir, "ffprobe")));
            }
        }

        if let Some(bin) = &cfg.ffmpeg_bin {
            if bin.is_file() {
                let ffprobe = bin
                    .parent()
                    .and_then(|dir| find_in_dir(dir, "ffprobe"))
                    .or_else(|| cfg.search_path.then(|| find_on_path("ffprobe")).flatten());
                info!(target: "toolchain", path = %bin.display(), "Using ffmpeg from FFMPEG_BIN");
                return Ok(Self::new(bin, ffprobe));
            }
            warn!(target: "toolchain", path = %bin.display(), "FFMPEG_BIN does not point to a file; ignoring");
        }

        if cfg.search_path {
            if let Some(ffmpeg) = find_on_path("ffmpeg") {
                info!(target: "toolchain", path = %ffmpeg.display(), "Using ffmpeg found on PATH");
                return Ok(Self::new(ffmpeg, find_on_path("ffprobe")));
            }
        }

        Err(VoiceChapterError::ToolchainUnresolved(
            "ffmpeg was not found; pass its path or folder, set FFMPEG_BIN, or place the binaries in the managed ffmpeg-binaries folder"
                .to_string(),
        ))
    }
}

fn exe_name(base: &str) -> String {
    format!("{}{}", base, std::env::consts::EXE_SUFFIX)
}

fn find_in_dir(dir: &Path, base: &str) -> Option<PathBuf> {
    let candidate = dir.join(exe_name(base));
    candidate.is_file().then_some(candidate)
}

/// Look `bin` up on `PATH`.
pub fn find_on_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| find_in_dir(&dir, bin))
}
