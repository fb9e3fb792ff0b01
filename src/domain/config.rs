//! Application configuration.
//!
//! Every section and field has a default, so a partial or missing
//! `config.toml` is always usable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::models::UserContext;

/// Identity used for new sessions and sent with every responder request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
    #[serde(default = "default_user_name")]
    pub name: String,
    #[serde(default = "default_user_role")]
    pub role: String,
    #[serde(default = "default_user_team")]
    pub team: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            name: default_user_name(),
            role: default_user_role(),
            team: default_user_team(),
        }
    }
}

fn default_user_id() -> String {
    "guest".into()
}

fn default_user_name() -> String {
    "Guest".into()
}

fn default_user_role() -> String {
    "User".into()
}

fn default_user_team() -> String {
    "General".into()
}

/// AI responder webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Webhook URL; empty disables the responder.
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_responder_timeout")]
    pub timeout_secs: u64,

    /// Tag sent as `system` in every request.
    #[serde(default = "default_system")]
    pub system: String,

    /// Prior turns sent as context (at most 5).
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: default_responder_timeout(),
            system: default_system(),
            context_turns: default_context_turns(),
        }
    }
}

const fn default_responder_timeout() -> u64 {
    30
}

fn default_system() -> String {
    "hookchat".into()
}

const fn default_context_turns() -> usize {
    5
}

/// Remote backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether remote sync is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Upload the collection after each successful save.
    #[serde(default = "default_upload_on_save")]
    pub upload_on_save: bool,

    /// Well-known workspace folder name.
    #[serde(default = "default_folder_name")]
    pub folder_name: String,

    /// File name used by `sync push`.
    #[serde(default = "default_backup_name")]
    pub backup_name: String,

    /// Files starting with this prefix and ending in `.json` count as backups.
    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,

    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,

    /// Base URL of the remote storage API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upload_on_save: default_upload_on_save(),
            folder_name: default_folder_name(),
            backup_name: default_backup_name(),
            backup_prefix: default_backup_prefix(),
            timeout_secs: default_sync_timeout(),
            api_base: default_api_base(),
        }
    }
}

const fn default_upload_on_save() -> bool {
    true
}

fn default_folder_name() -> String {
    "HookchatBackups".into()
}

fn default_backup_name() -> String {
    "chat_sessions_backup.json".into()
}

fn default_backup_prefix() -> String {
    "chat_sessions".into()
}

const fn default_sync_timeout() -> u64 {
    45
}

fn default_api_base() -> String {
    "https://www.googleapis.com".into()
}

/// OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Client secrets file (defaults to `<data_dir>/client_secrets.json`).
    #[serde(default)]
    pub client_secrets: Option<PathBuf>,

    /// Exported credential file (defaults to `<data_dir>/credential.json`).
    #[serde(default)]
    pub credential_file: Option<PathBuf>,

    /// Refresh this many seconds before the access token expires.
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: i64,

    #[serde(default = "default_auth_timeout")]
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: None,
            credential_file: None,
            refresh_skew_secs: default_refresh_skew(),
            timeout_secs: default_auth_timeout(),
        }
    }
}

const fn default_refresh_skew() -> i64 {
    60
}

const fn default_auth_timeout() -> u64 {
    20
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub responder: ResponderConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hookchat")
    }

    /// `SQLite` session database.
    #[must_use]
    pub fn storage_db_path(&self) -> PathBuf {
        self.data_dir().join("sessions.db")
    }

    /// JSON mirror of the session collection.
    #[must_use]
    pub fn json_mirror_path(&self) -> PathBuf {
        self.data_dir().join("sessions.json")
    }

    #[must_use]
    pub fn client_secrets_path(&self) -> PathBuf {
        self.auth
            .client_secrets
            .clone()
            .unwrap_or_else(|| self.data_dir().join("client_secrets.json"))
    }

    #[must_use]
    pub fn credential_file_path(&self) -> PathBuf {
        self.auth
            .credential_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("credential.json"))
    }

    /// Owner for newly created sessions.
    #[must_use]
    pub fn user_context(&self) -> UserContext {
        UserContext::new(&self.user.name, &self.user.role, &self.user.team)
    }
}
