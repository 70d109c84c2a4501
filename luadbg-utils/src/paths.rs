//! Path utilities for luadbg
//!
//! Handles XDG Base Directory specification compliance for config,
//! state and data directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "luadbg";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/luadbg` or `~/.config/luadbg`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback(".config"))
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/luadbg/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/luadbg` or `~/.local/state/luadbg`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| home_fallback(".local/state"))
}

/// Get the data directory
///
/// Location: `$XDG_DATA_HOME/luadbg` or `~/.local/share/luadbg`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback(".local/share"))
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/luadbg/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the directory holding per-project watch stores
///
/// Location: `$XDG_DATA_HOME/luadbg/watches`
pub fn watch_store_dir() -> PathBuf {
    data_dir().join("watches")
}

fn home_fallback(relative: &str) -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(relative)
        .join(APP_NAME)
}
