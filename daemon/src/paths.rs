//! Canonical locations of the screenwatch configuration file.
//!
//! Checked in order, first existing file wins:
//!   - the path given on the command line, if any
//!   - $XDG_CONFIG_HOME/screenwatch/config.toml
//!   - /etc/screenwatch/config.toml
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "screenwatch";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const SYSTEM_CONFIG_DIR: &str = "/etc";

/// Returns the per-user config file path, if a config directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Returns the system-wide config file path: /etc/screenwatch/config.toml
pub fn system_config_path() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR)
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// All candidate locations in lookup order.
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(user_config_path());
    candidates.push(system_config_path());
    candidates
}

/// Returns the first candidate that exists on disk.
pub fn find_config_file(candidates: &[PathBuf]) -> Option<&Path> {
    candidates.iter().map(PathBuf::as_path).find(|p| p.exists())
}
