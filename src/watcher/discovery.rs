//! Log directory and log file discovery.
//!
//! VRChat writes one `output_log_<date>.txt` per session into a fixed
//! directory; the active file is the one modified most recently.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::error::WatcherError;

/// Environment variable overriding the log directory.
pub const LOG_DIR_ENV: &str = "VRCLOG_LOGDIR";

/// File name prefix of VRChat log files.
pub const LOG_FILE_PREFIX: &str = "output_log_";

/// File extension of VRChat log files.
pub const LOG_FILE_EXTENSION: &str = "txt";

/// Steam app id of VRChat, used for the Proton prefix path.
const VRCHAT_APP_ID: &str = "438100";

/// Locates the log directory and the currently active log file.
pub trait PathResolver: Send + Sync {
    /// Resolve the directory to watch, preferring `explicit` when given.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::LogDirNotFound`] if the chosen directory does
    /// not exist, or [`WatcherError::LogDirUnknown`] if none can be chosen.
    fn resolve_directory(&self, explicit: Option<&Path>) -> Result<PathBuf, WatcherError>;

    /// Resolve the most recently modified log file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::NoLogFiles`] if the directory has no log
    /// files, and [`WatcherError::LogDirNotFound`] if it does not exist.
    fn resolve_latest_file(&self, dir: &Path) -> Result<PathBuf, WatcherError>;
}

/// Default resolver for VRChat log locations.
///
/// Directory order: explicit override, `VRCLOG_LOGDIR`, then the first
/// existing platform candidate (Windows `LocalLow`, Steam Proton prefixes).
#[derive(Debug, Clone, Default)]
pub struct LogPathResolver {
    candidates: Option<Vec<PathBuf>>,
}

impl LogPathResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `candidates` instead of the platform defaults.
    #[must_use]
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates: Some(candidates),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        self.candidates.clone().unwrap_or_else(default_candidates)
    }
}

impl PathResolver for LogPathResolver {
    fn resolve_directory(&self, explicit: Option<&Path>) -> Result<PathBuf, WatcherError> {
        if let Some(dir) = explicit {
            return existing_dir(dir);
        }

        if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!(env = LOG_DIR_ENV, "Using log directory from environment");
            return existing_dir(Path::new(&dir));
        }

        let candidates = self.candidates();
        tracing::debug!(candidates = candidates.len(), "Probing default log directories");
        candidates
            .into_iter()
            .find(|dir| dir.is_dir())
            .ok_or(WatcherError::LogDirUnknown)
    }

    fn resolve_latest_file(&self, dir: &Path) -> Result<PathBuf, WatcherError> {
        list_log_files(dir)?
            .pop()
            .ok_or_else(|| WatcherError::NoLogFiles(dir.to_path_buf()))
    }
}

/// Platform default log directories, most likely first.
#[must_use]
pub fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // %LOCALAPPDATA% is ...\AppData\Local; VRChat writes to the LocalLow sibling.
    if let Some(local) = dirs::data_local_dir() {
        if let Some(appdata) = local.parent() {
            candidates.push(appdata.join("LocalLow").join("VRChat").join("VRChat"));
        }
    }

    if let Some(home) = dirs::home_dir() {
        for steam in [
            home.join(".steam").join("steam"),
            home.join(".local").join("share").join("Steam"),
        ] {
            candidates.push(
                steam
                    .join("steamapps")
                    .join("compatdata")
                    .join(VRCHAT_APP_ID)
                    .join("pfx/drive_c/users/steamuser/AppData/LocalLow/VRChat/VRChat"),
            );
        }
    }

    candidates
}

/// Whether `path` names a VRChat log file.
#[must_use]
pub fn is_log_file_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(LOG_FILE_PREFIX)
        && path
            .extension()
            .is_some_and(|ext| ext == LOG_FILE_EXTENSION)
}

/// All log files in `dir`, oldest first by modification time.
///
/// Files with equal modification times are ordered by name.
///
/// # Errors
///
/// Returns [`WatcherError::LogDirNotFound`] if `dir` does not exist and
/// [`WatcherError::Io`] if it cannot be read.
pub fn list_log_files(dir: &Path) -> Result<Vec<PathBuf>, WatcherError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatcherError::LogDirNotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(WatcherError::Io(e)),
    };

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| is_log_file_name(&entry.path()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let modified = metadata.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn existing_dir(dir: &Path) -> Result<PathBuf, WatcherError> {
    if dir.is_dir() {
        Ok(dir.to_path_buf())
    } else {
        Err(WatcherError::LogDirNotFound(dir.to_path_buf()))
    }
}
