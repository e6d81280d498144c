//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "QQBOT_HOME";

/// The qqbot base directory: `$QQBOT_HOME`, else `~/.qqbot`.
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".qqbot"))
        .ok_or_else(|| {
            ConfigError::Validation(format!("could not determine home directory; set {}", HOME_ENV))
        })
}

/// Get the main config file path (~/.qqbot/qqbot.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("qqbot.json5"))
}

/// Get the default session snapshot directory (~/.qqbot/sessions).
pub fn sessions_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("sessions"))
}

/// Snapshot file for one bot identity inside `dir`.
pub fn session_snapshot_file(dir: &std::path::Path, bot_id: &str) -> PathBuf {
    let safe: String = bot_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}.session.json", safe))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
