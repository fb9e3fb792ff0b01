//! Application context.
//!
//! One `App` is built at startup and handed to every command. It owns the
//! session store, the OAuth flow, the sync manager and the responder, and
//! sequences them: chat turns are persisted locally first, and only then,
//! best effort, backed up.

use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::domain::{
    AppConfig, AppError, ChatMessage, ChatSession, RemoteFileHandle, Responder, ResponderRequest,
    Result, Role, SessionCollection, SyncError,
};
use crate::infrastructure::{
    CredentialFile, DriveClient, HttpTokenEndpoint, LocalStorage, WebhookResponder,
};

use super::auth_flow::{AuthFlow, AuthState};
use super::normalizer::normalize_bytes;
use super::session_store::SessionStore;
use super::sync_manager::{merge_with_report, MergeReport, SyncManager};

/// What happened to the remote backup after a local write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Sync is disabled or not triggered by this write.
    Skipped,
    Uploaded { name: String },
    Failed { message: String },
}

/// Result of sending one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Assistant turn as recorded in the session.
    pub reply: String,
    /// False when the reply is a responder failure notice.
    pub answered: bool,
    pub sync: SyncStatus,
}

/// Result of pulling a remote backup into the local collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub backup: RemoteFileHandle,
    pub report: MergeReport,
}

/// Process-wide context threaded through every command.
pub struct App {
    config: AppConfig,
    sessions: SessionStore,
    auth: AuthFlow,
    sync: SyncManager,
    responder: Box<dyn Responder>,
    credential_file: CredentialFile,
    credential_exported: bool,
}

impl App {
    /// Assembles the context from already-built parts and restores any
    /// exported credential.
    #[must_use]
    pub fn new(
        config: AppConfig,
        sessions: SessionStore,
        auth: AuthFlow,
        sync: SyncManager,
        responder: Box<dyn Responder>,
        credential_file: CredentialFile,
    ) -> Self {
        let mut app = Self {
            config,
            sessions,
            auth,
            sync,
            responder,
            credential_file,
            credential_exported: false,
        };
        app.restore_exported_credential();
        app
    }

    /// Builds the production context for `config`.
    ///
    /// # Errors
    /// Returns error if an HTTP client cannot be constructed.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let sessions = SessionStore::open(LocalStorage::from_config(&config));
        let endpoint = HttpTokenEndpoint::new(config.auth.timeout_secs)?;
        let auth = AuthFlow::new(Box::new(endpoint), config.auth.refresh_skew_secs);
        let drive = DriveClient::from_config(&config.sync)?;
        let sync = SyncManager::from_config(Box::new(drive), &config.sync);
        let responder = WebhookResponder::from_config(&config.responder)?;
        let credential_file = CredentialFile::new(config.credential_file_path());

        Ok(Self::new(
            config,
            sessions,
            auth,
            sync,
            Box::new(responder),
            credential_file,
        ))
    }

    fn restore_exported_credential(&mut self) {
        match self.credential_file.load() {
            Ok(Some(credential)) => {
                tracing::debug!(path = %self.credential_file.path().display(), "Restored exported credential");
                self.auth.restore(credential);
                self.credential_exported = true;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential export");
            }
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub const fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthFlow {
        &self.auth
    }

    #[must_use]
    pub const fn credential_exported(&self) -> bool {
        self.credential_exported
    }

    #[must_use]
    pub fn credential_path(&self) -> &Path {
        self.credential_file.path()
    }

    /// See [`SessionStore::resolve_id`].
    ///
    /// # Errors
    /// Returns error if nothing (or more than one session) matches.
    pub fn resolve_session(&self, input: &str) -> Result<String> {
        self.sessions.resolve_id(input)
    }

    /// Looks up a session by exact id.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if absent.
    pub fn session(&self, id: &str) -> Result<&ChatSession> {
        self.sessions.get(id).ok_or_else(|| AppError::not_found(id))
    }

    /// Creates and persists a new session for the configured user.
    ///
    /// # Errors
    /// Returns error if the collection cannot be saved.
    pub fn create_session(&mut self, name: Option<&str>) -> Result<(String, SyncStatus)> {
        let owner = self.config.user_context();
        let id = self.sessions.create_session_at(&owner, Utc::now(), name);
        let status = self.persist()?;
        Ok((id, status))
    }

    /// Renames a session and persists the change.
    ///
    /// # Errors
    /// Returns error if the session is missing, the name is empty, or the
    /// save fails.
    pub fn rename_session(&mut self, id: &str, name: &str) -> Result<SyncStatus> {
        self.sessions.rename_session(id, name)?;
        self.persist()
    }

    /// Deletes a session and persists the change.
    ///
    /// # Errors
    /// Returns error if the session is missing or the save fails.
    pub fn delete_session(&mut self, id: &str) -> Result<(ChatSession, SyncStatus)> {
        let removed = self.sessions.delete_session(id)?;
        Ok((removed, self.sync_after_save()))
    }

    /// Sends one user message and records the exchange.
    ///
    /// Responder failures never fail the send: their status line is recorded
    /// as the assistant turn. Backup failures are reported in the outcome.
    ///
    /// # Errors
    /// `SessionNotFound`, `InvalidData` for blank text, or a local save failure.
    pub fn send_message(&mut self, session_id: &str, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidData {
                message: "message is empty".into(),
            });
        }

        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| AppError::not_found(session_id))?;

        let now = Utc::now();
        let request = ResponderRequest::for_turn(
            session,
            &self.config.user.id,
            text,
            self.config.responder.context_turns,
            Some(self.config.responder.system.as_str()),
            now,
        );

        self.sessions
            .append_message(session_id, ChatMessage::new(Role::User, text, now))?;

        let (reply, answered) = match self.responder.respond(&request) {
            Ok(body) => (normalize_bytes(&body), true),
            Err(e) => {
                tracing::warn!(error = %e, session = %session_id, "Responder call failed");
                (e.status_message(), false)
            }
        };

        self.sessions
            .append_message(session_id, ChatMessage::assistant(reply.clone()))?;

        let sync = self.persist()?;
        Ok(SendOutcome {
            reply,
            answered,
            sync,
        })
    }

    /// Saves locally, then uploads if configured to.
    fn persist(&mut self) -> Result<SyncStatus> {
        self.sessions.save()?;
        Ok(self.sync_after_save())
    }

    fn sync_after_save(&mut self) -> SyncStatus {
        if !(self.config.sync.enabled && self.config.sync.upload_on_save) {
            return SyncStatus::Skipped;
        }

        let name = self.config.sync.backup_name.clone();
        let result = self
            .sync
            .upload(&mut self.auth, self.sessions.collection(), &name);
        self.sync_exported_credential();

        match result {
            Ok(handle) => SyncStatus::Uploaded { name: handle.name },
            Err(e) => {
                if e.is_transient() {
                    tracing::info!(error = %e, "Backup after save deferred");
                } else {
                    tracing::warn!(error = %e, "Backup after save failed");
                }
                SyncStatus::Failed {
                    message: e.status_message(),
                }
            }
        }
    }

    /// Uploads the collection now, under `name` or the configured backup name.
    ///
    /// # Errors
    /// Returns the `SyncError` if the upload fails.
    pub fn push_backup(&mut self, name: Option<&str>) -> Result<RemoteFileHandle> {
        let name = name.map_or_else(|| self.config.sync.backup_name.clone(), String::from);
        let result = self
            .sync
            .upload(&mut self.auth, self.sessions.collection(), &name);
        self.sync_exported_credential();
        Ok(result?)
    }

    /// Finds (or creates) the remote backup folder and returns its id.
    ///
    /// # Errors
    /// Returns the `SyncError` if the lookup or create fails.
    pub fn resolve_workspace(&mut self) -> Result<String> {
        let result = self.sync.resolve_workspace(&mut self.auth);
        self.sync_exported_credential();
        Ok(result?)
    }

    /// Backups in the workspace, newest first.
    ///
    /// # Errors
    /// Returns the `SyncError` if listing fails.
    pub fn list_backups(&mut self) -> Result<Vec<RemoteFileHandle>> {
        let result = self.sync.list_backups(&mut self.auth);
        self.sync_exported_credential();
        Ok(result?)
    }

    /// Downloads a backup (by name or remote id, or the newest) and merges it in.
    ///
    /// The merged collection is saved locally but not re-uploaded.
    ///
    /// # Errors
    /// `NotFound` if there is no such backup, `CorruptBackup`, any other
    /// `SyncError`, or a local save failure.
    pub fn pull_backup(&mut self, name: Option<&str>) -> Result<PullOutcome> {
        let fetched = self.fetch_backup(name);
        self.sync_exported_credential();
        let (backup, remote) = fetched?;

        let (merged, report) = merge_with_report(self.sessions.collection(), &remote);
        self.sessions.replace_collection(merged);
        self.sessions.save()?;

        tracing::info!(
            backup = %backup.name,
            added = report.added,
            replaced = report.replaced,
            kept = report.kept,
            "Backup merged"
        );
        Ok(PullOutcome { backup, report })
    }

    fn fetch_backup(
        &mut self,
        name: Option<&str>,
    ) -> std::result::Result<(RemoteFileHandle, SessionCollection), SyncError> {
        let backup = match name {
            Some(name) => self.sync.find_backup(&mut self.auth, name)?,
            None => self
                .sync
                .list_backups(&mut self.auth)?
                .into_iter()
                .next()
                .ok_or_else(|| SyncError::NotFound {
                    what: format!("any backup in '{}'", self.sync.folder_name()),
                })?,
        };
        let remote = self.sync.download(&mut self.auth, &backup)?;
        Ok((backup, remote))
    }

    /// Starts sign-in with the client secrets file at `path` (or the
    /// configured one). Returns the consent URL.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a desktop client.
    pub fn begin_sign_in(&mut self, path: Option<&Path>) -> Result<String> {
        let path = path.map_or_else(|| self.config.client_secrets_path(), Path::to_path_buf);
        let raw = fs::read_to_string(&path).map_err(|e| {
            AppError::io(format!("Failed to read client secrets {}", path.display()), e)
        })?;
        Ok(self.auth.begin(&raw)?)
    }

    /// Completes sign-in with the pasted code or redirect URL.
    ///
    /// With `export`, the credential is written to the credential file so
    /// later runs stay signed in.
    ///
    /// # Errors
    /// `ExchangeFailed`, or an I/O error writing the export.
    pub fn complete_sign_in(&mut self, input: &str, export: bool) -> Result<()> {
        let credential = self.auth.complete(input)?;
        if export {
            self.credential_file.save(&credential)?;
            self.credential_exported = true;
        }
        Ok(())
    }

    /// Forgets the credential and removes any export.
    ///
    /// # Errors
    /// Returns error if the export exists but cannot be removed.
    pub fn sign_out(&mut self) -> Result<bool> {
        self.auth.reset();
        self.credential_exported = false;
        self.credential_file.remove()
    }

    /// Keeps the export in step with `AuthFlow` after any remote call.
    ///
    /// A refreshed credential is written back; a credential the flow has
    /// dropped (failed refresh) is removed so the next run starts signed out.
    fn sync_exported_credential(&mut self) {
        let refreshed = self.auth.take_refreshed();
        if !self.credential_exported {
            return;
        }

        let result = match self.auth.credential() {
            Some(credential) if refreshed => self.credential_file.save(credential),
            Some(_) => return,
            None => {
                self.credential_exported = false;
                tracing::info!(path = %self.credential_file.path().display(), "Removing revoked credential export");
                self.credential_file.remove().map(|_| ())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to update exported credential");
        }
    }
}
