//! Configuration file management.
//!
//! Handles loading and creating the TOML configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

use super::atomic_file::write_atomic;

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# hookchat configuration
# Auto-generated - edit as needed

[user]
id = "guest"
name = "Guest"
role = "User"
team = "General"

[responder]
# Webhook that answers chat messages (empty = disabled)
webhook_url = ""
timeout_secs = 30
system = "hookchat"
# Prior turns sent as context (at most 5)
context_turns = 5

[sync]
# Back up sessions to remote storage after each save
enabled = false
upload_on_save = true
folder_name = "HookchatBackups"
backup_name = "chat_sessions_backup.json"
backup_prefix = "chat_sessions"
timeout_secs = 45

[auth]
# client_secrets = "/path/to/client_secrets.json"
# credential_file = "/path/to/credential.json"
refresh_skew_secs = 60
timeout_secs = 20

[paths]
# Custom data directory (optional, defaults to ~/.hookchat)
# data_dir = "/custom/path"
"#;

/// Load configuration from file or fall back to defaults.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config() -> Result<AppConfig> {
    let config_path = config_file_path();

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Create the default configuration file if it doesn't exist.
///
/// Returns the path and whether it was newly created.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<(PathBuf, bool)> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok((config_path, false));
    }

    write_atomic(&config_path, DEFAULT_CONFIG.as_bytes())?;
    tracing::info!(path = %config_path.display(), "Created default configuration");

    Ok((config_path, true))
}

/// Get the path to the configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}
