//! Config path utilities

use std::path::{Path, PathBuf};

/// Name of the config file, both in the working directory and the data dir
pub const CONFIG_FILE: &str = "config.json";

/// Relay data directory (~/.relay)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

/// Per-user config location
pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

/// Config in the current working directory
pub fn local_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

/// Resolve which config file to read.
///
/// An explicit path always wins. Otherwise `./config.json` is preferred when it
/// exists, falling back to `~/.relay/config.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let local = local_config_path();
    if local.exists() {
        local
    } else {
        config_path()
    }
}

/// Create a directory and its parents if missing
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
