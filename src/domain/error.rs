//! Domain-level error types for hookchat.
//!
//! All errors are typed with `thiserror`. The boundary enums (`AuthError`,
//! `SyncError`, `ResponderError`) are recovered where they occur and carry a
//! short `status_message()` for display; `AppError` is what the CLI surfaces.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Failed to open or query the local database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid or inconsistent data.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// JSON parsing or serialization failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// No session matches the given id.
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Responder(#[from] ResponderError),
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a session-not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of the OAuth authorization-code flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The client descriptor could not be parsed or lacks required fields.
    #[error("malformed client credentials: {reason}")]
    MalformedCredentials { reason: String },

    /// The descriptor is not an installed (desktop) OAuth client.
    #[error("unsupported OAuth client type '{found}', an installed (desktop) client is required")]
    InvalidCredentialType { found: String },

    /// Exchanging the authorization code for tokens failed.
    #[error("authorization code exchange failed: {reason}")]
    ExchangeFailed { reason: String },

    /// Refreshing the access token failed; the credential was discarded.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// A token was requested but no credential is held.
    #[error("not signed in to remote storage")]
    NotAuthenticated,
}

impl AuthError {
    pub fn exchange(reason: impl Into<String>) -> Self {
        Self::ExchangeFailed {
            reason: reason.into(),
        }
    }

    pub fn refresh(reason: impl Into<String>) -> Self {
        Self::RefreshFailed {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCredentials {
            reason: reason.into(),
        }
    }

    /// Short human-readable status line.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::MalformedCredentials { .. } => {
                "The client credentials file could not be read. Download it again.".into()
            }
            Self::InvalidCredentialType { .. } => {
                "Use a desktop (installed app) OAuth client, not a service account.".into()
            }
            Self::ExchangeFailed { .. } => {
                "Sign-in failed. The code may be invalid or expired, try again.".into()
            }
            Self::RefreshFailed { .. } => "Your sign-in expired. Please sign in again.".into(),
            Self::NotAuthenticated => "Sign in to enable cloud backup.".into(),
        }
    }
}

/// Failures talking to the remote object store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("remote storage request timed out")]
    Timeout,

    #[error("could not reach remote storage: {reason}")]
    ConnectionFailed { reason: String },

    #[error("remote storage returned HTTP {code}")]
    HttpStatus { code: u16 },

    #[error("remote storage refused the request: {reason}")]
    QuotaOrPermission { reason: String },

    #[error("remote file not found: {what}")]
    NotFound { what: String },

    #[error("backup '{name}' is corrupt: {reason}")]
    CorruptBackup { name: String, reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SyncError {
    /// Short human-readable status line.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::Timeout => "Cloud backup timed out. Retry in a moment.".into(),
            Self::ConnectionFailed { .. } => {
                "Could not reach cloud storage. Check your connection and retry.".into()
            }
            Self::HttpStatus { code } => format!("Cloud storage error (HTTP {code}). Retry later."),
            Self::QuotaOrPermission { .. } => {
                "Cloud storage refused the request (quota or permission).".into()
            }
            Self::NotFound { what } => format!("Cloud backup not found: {what}"),
            Self::CorruptBackup { name, .. } => format!("Backup '{name}' could not be read."),
            Self::Auth(e) => e.status_message(),
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed { .. } | Self::HttpStatus { .. }
        )
    }
}

/// Failures calling the AI responder webhook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("responder webhook URL is not configured")]
    NotConfigured,

    #[error("responder request timed out")]
    Timeout,

    #[error("could not reach responder: {reason}")]
    ConnectionFailed { reason: String },

    #[error("responder returned HTTP {code}")]
    HttpStatus { code: u16 },
}

impl ResponderError {
    /// Short human-readable status line, recorded as the assistant turn.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::NotConfigured => {
                "Webhook not set. Configure responder.webhook_url in config.toml.".into()
            }
            Self::Timeout => "The AI service took too long to answer. Please try again.".into(),
            Self::ConnectionFailed { reason } => format!("Connection error: {reason}"),
            Self::HttpStatus { .. } => "Unable to connect to AI service. Please try again.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_wraps_into_sync_error() {
        let err: SyncError = AuthError::NotAuthenticated.into();
        assert_eq!(err.status_message(), "Sign in to enable cloud backup.");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_sync_errors() {
        assert!(SyncError::Timeout.is_transient());
        assert!(SyncError::HttpStatus { code: 503 }.is_transient());
        assert!(!SyncError::CorruptBackup {
            name: "x".into(),
            reason: "y".into()
        }
        .is_transient());
    }

    #[test]
    fn test_status_messages_are_not_empty() {
        let errors = [
            ResponderError::NotConfigured,
            ResponderError::Timeout,
            ResponderError::HttpStatus { code: 500 },
        ];
        for err in errors {
            assert!(!err.status_message().is_empty());
        }
    }
}
