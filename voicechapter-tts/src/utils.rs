//! Binary lookup shared by the TTS engines.

use std::path::{Path, PathBuf};

/// `env_key` if it names an existing file, otherwise `default_bin` on `PATH`.
pub(crate) fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.is_file() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

pub(crate) fn get_from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.is_file() { Some(p) } else { None };
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| executable_in(&dir, bin))
}

/// `<dir>/<bin>[.exe]` if present.
pub(crate) fn executable_in(dir: &Path, bin: &str) -> Option<PathBuf> {
    let candidate = dir.join(format!("{}{}", bin, std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

pub(crate) fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

pub(crate) fn timeout_ms_from_env() -> u64 {
    std::env::var("TTS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(60_000)
}

/// Folder next to the running executable, used for managed downloads.
pub(crate) fn beside_executable(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}
