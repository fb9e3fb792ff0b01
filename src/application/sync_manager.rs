//! Remote backup of the session collection.
//!
//! Backups live in one well-known workspace folder of the remote object
//! store. Every operation asks the token provider for a fresh access token,
//! and every failure comes back as a `SyncError`; nothing here panics or
//! touches local state.

use std::cmp::Ordering;

use serde::Serialize;

use crate::domain::{
    AccessTokenProvider, ObjectStore, RemoteFileHandle, SessionCollection, SyncConfig, SyncError,
};

/// Outcome of merging a remote collection into a local one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Remote sessions not present locally.
    pub added: usize,
    /// Local sessions replaced by a more recently active remote copy.
    pub replaced: usize,
    /// Colliding sessions where the local copy was kept.
    pub kept: usize,
}

/// Uploads, lists and downloads backups in the remote workspace.
pub struct SyncManager {
    store: Box<dyn ObjectStore>,
    folder_name: String,
    backup_prefix: String,
}

impl SyncManager {
    #[must_use]
    pub fn new(store: Box<dyn ObjectStore>, folder_name: &str, backup_prefix: &str) -> Self {
        Self {
            store,
            folder_name: folder_name.to_string(),
            backup_prefix: backup_prefix.to_string(),
        }
    }

    #[must_use]
    pub fn from_config(store: Box<dyn ObjectStore>, config: &SyncConfig) -> Self {
        Self::new(store, &config.folder_name, &config.backup_prefix)
    }

    #[must_use]
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Finds the workspace folder, creating it if absent.
    ///
    /// Existence is re-checked right before creating. If duplicates turn up
    /// (two clients racing), the oldest folder is used by everyone.
    ///
    /// # Errors
    /// Returns `SyncError` if the token or any remote call fails.
    pub fn resolve_workspace(
        &self,
        auth: &mut dyn AccessTokenProvider,
    ) -> Result<String, SyncError> {
        let token = auth.access_token()?;
        self.workspace_with(&token)
    }

    fn workspace_with(&self, token: &str) -> Result<String, SyncError> {
        if let Some(folder) = self.existing_folder(token)? {
            return Ok(folder);
        }
        // Another client may have created it since the first look.
        if let Some(folder) = self.existing_folder(token)? {
            return Ok(folder);
        }

        let created = self.store.create_folder(token, &self.folder_name)?;

        // Converge on one folder if a concurrent create slipped in.
        Ok(self.existing_folder(token)?.unwrap_or(created.id))
    }

    fn existing_folder(&self, token: &str) -> Result<Option<String>, SyncError> {
        let folders = self.store.find_folders(token, &self.folder_name)?;
        if folders.len() > 1 {
            tracing::warn!(
                folder = %self.folder_name,
                count = folders.len(),
                "Duplicate workspace folders found, using the oldest"
            );
        }
        Ok(canonical(folders).map(|f| f.id))
    }

    /// Writes the whole collection to `name` in the workspace.
    ///
    /// Updates the existing file of that name in place, or creates it.
    ///
    /// # Errors
    /// Returns `SyncError` if the token or any remote call fails.
    pub fn upload(
        &self,
        auth: &mut dyn AccessTokenProvider,
        collection: &SessionCollection,
        name: &str,
    ) -> Result<RemoteFileHandle, SyncError> {
        let content = collection.to_json().map_err(|e| SyncError::CorruptBackup {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let token = auth.access_token()?;
        let folder = self.workspace_with(&token)?;

        let existing = self.store.find_files(&token, &folder, name)?;
        if existing.len() > 1 {
            tracing::warn!(file = %name, count = existing.len(), "Duplicate backup files, updating the oldest");
        }

        let handle = match canonical(existing) {
            Some(file) => self.store.update_file(&token, &file.id, &content)?,
            None => self.store.create_file(&token, &folder, name, &content)?,
        };

        tracing::info!(
            file = %handle.name,
            sessions = collection.len(),
            bytes = content.len(),
            "Backup uploaded"
        );
        Ok(handle)
    }

    /// Backup files in the workspace, newest first.
    ///
    /// A backup is a file named `<prefix>*.json`.
    ///
    /// # Errors
    /// Returns `SyncError` if the token or any remote call fails.
    pub fn list_backups(
        &self,
        auth: &mut dyn AccessTokenProvider,
    ) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let token = auth.access_token()?;
        let folder = self.workspace_with(&token)?;

        let mut backups: Vec<RemoteFileHandle> = self
            .store
            .list_files(&token, &folder)?
            .into_iter()
            .filter(|f| self.is_backup_name(&f.name))
            .collect();

        backups.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(backups)
    }

    /// A workspace file by remote id, or else the newest file named exactly
    /// `name_or_id`.
    ///
    /// Any file in the workspace qualifies, so uploads under a name outside
    /// the `<prefix>*.json` pattern can still be pulled.
    ///
    /// # Errors
    /// `NotFound` if nothing matches, or any listing failure.
    pub fn find_backup(
        &self,
        auth: &mut dyn AccessTokenProvider,
        name_or_id: &str,
    ) -> Result<RemoteFileHandle, SyncError> {
        let token = auth.access_token()?;
        let folder = self.workspace_with(&token)?;
        let files = self.store.list_files(&token, &folder)?;

        if let Some(file) = files.iter().find(|f| f.id == name_or_id) {
            return Ok(file.clone());
        }

        files
            .into_iter()
            .filter(|f| f.name == name_or_id)
            .max_by(|a, b| a.modified_at.cmp(&b.modified_at))
            .ok_or_else(|| SyncError::NotFound {
                what: name_or_id.into(),
            })
    }

    /// Fetches and parses a backup.
    ///
    /// # Errors
    /// `CorruptBackup` if the content is not a session collection, or any
    /// remote failure.
    pub fn download(
        &self,
        auth: &mut dyn AccessTokenProvider,
        handle: &RemoteFileHandle,
    ) -> Result<SessionCollection, SyncError> {
        let token = auth.access_token()?;
        let data = self.store.download(&token, &handle.id)?;

        SessionCollection::from_json(&data).map_err(|e| {
            tracing::warn!(file = %handle.name, error = %e, "Backup could not be parsed");
            SyncError::CorruptBackup {
                name: handle.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn is_backup_name(&self, name: &str) -> bool {
        name.starts_with(&self.backup_prefix)
            && std::path::Path::new(name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }
}

/// Oldest handle, ties broken by lowest id.
fn canonical(handles: Vec<RemoteFileHandle>) -> Option<RemoteFileHandle> {
    handles.into_iter().min_by(|a, b| {
        match a.modified_at.cmp(&b.modified_at) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    })
}

/// Key-wise union of two collections.
///
/// When both hold a session id, the copy with the later `last_activity`
/// wins whole; on equal activity the local copy is kept.
#[must_use]
pub fn merge_into(local: &SessionCollection, remote: &SessionCollection) -> SessionCollection {
    merge_with_report(local, remote).0
}

/// [`merge_into`] plus counts of what changed.
#[must_use]
pub fn merge_with_report(
    local: &SessionCollection,
    remote: &SessionCollection,
) -> (SessionCollection, MergeReport) {
    let mut merged = local.clone();
    let mut report = MergeReport::default();

    for theirs in remote.iter() {
        match merged.get(theirs.id()) {
            None => {
                merged.insert(theirs.clone());
                report.added += 1;
            }
            Some(ours) if theirs.last_activity() > ours.last_activity() => {
                merged.insert(theirs.clone());
                report.replaced += 1;
            }
            Some(_) => report.kept += 1,
        }
    }

    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{InMemoryObjectStore, StaticToken};
    use crate::domain::{AuthError, ChatMessage, ChatSession, Role, UserContext};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn manager() -> (InMemoryObjectStore, SyncManager) {
        let store = InMemoryObjectStore::default();
        let manager = SyncManager::new(Box::new(store.clone()), "Backups", "chat_sessions");
        (store, manager)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn session(id: &str, activity: i64, text: &str) -> ChatSession {
        let mut s = ChatSession::new(id, id, UserContext::new("A", "B", "C"), at(0));
        s.push(ChatMessage::new(Role::User, text, at(activity)));
        s
    }

    fn collection(sessions: &[ChatSession]) -> SessionCollection {
        sessions.iter().cloned().collect()
    }

    #[test]
    fn test_resolve_workspace_is_idempotent() {
        let (store, manager) = manager();
        let mut auth = StaticToken::ok();

        let first = manager.resolve_workspace(&mut auth).unwrap();
        let second = manager.resolve_workspace(&mut auth).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.folder_creates(), 1);
    }

    #[test]
    fn test_resolve_workspace_picks_oldest_duplicate() {
        let (store, manager) = manager();
        let newer = store.add_folder("Backups", Duration::zero());
        let older = store.add_folder("Backups", Duration::hours(5));
        store.add_folder("Other", Duration::days(9));

        let resolved = manager.resolve_workspace(&mut StaticToken::ok()).unwrap();

        assert_eq!(resolved, older);
        assert_ne!(resolved, newer);
        assert_eq!(store.folder_creates(), 0);
    }

    #[test]
    fn test_upload_is_an_upsert() {
        let (store, manager) = manager();
        let mut auth = StaticToken::ok();
        let first = collection(&[session("a", 1, "one")]);
        let second = collection(&[session("a", 1, "one"), session("b", 2, "two")]);

        let h1 = manager.upload(&mut auth, &first, "chat_sessions_backup.json").unwrap();
        let h2 = manager.upload(&mut auth, &second, "chat_sessions_backup.json").unwrap();

        let files = store.files_named("chat_sessions_backup.json");
        assert_eq!(files.len(), 1);
        assert_eq!(h1.id, h2.id);
        assert_eq!(files[0].content, second.to_json().unwrap());
        assert_eq!(store.folder_creates(), 1);
    }

    #[test]
    fn test_list_backups_filters_and_sorts_newest_first() {
        let (store, manager) = manager();
        let mut auth = StaticToken::ok();
        let folder = manager.resolve_workspace(&mut auth).unwrap();

        store.add_file(&folder, "chat_sessions_old.json", b"{}");
        store.add_file(&folder, "notes.txt", b"x");
        store.add_file(&folder, "chat_sessions_new.json", b"{}");
        store.add_file(&folder, "chat_sessions.csv", b"x");
        store.add_file("elsewhere", "chat_sessions_other.json", b"{}");

        let names: Vec<String> = manager
            .list_backups(&mut auth)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["chat_sessions_new.json", "chat_sessions_old.json"]);
    }

    #[test]
    fn test_download_round_trips_upload() {
        let (_, manager) = manager();
        let mut auth = StaticToken::ok();
        let sessions = collection(&[session("a", 5, "hello")]);

        let handle = manager.upload(&mut auth, &sessions, "chat_sessions_x.json").unwrap();
        assert_eq!(manager.download(&mut auth, &handle).unwrap(), sessions);

        let found = manager.find_backup(&mut auth, "chat_sessions_x.json").unwrap();
        assert_eq!(found.id, handle.id);
        assert!(matches!(
            manager.find_backup(&mut auth, "chat_sessions_missing.json"),
            Err(SyncError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_backup_by_id() {
        let (store, manager) = manager();
        let mut auth = StaticToken::ok();
        let folder = manager.resolve_workspace(&mut auth).unwrap();
        let older = store.add_file(&folder, "chat_sessions_a.json", b"{}");
        store.add_file(&folder, "chat_sessions_a.json", b"{}");

        let found = manager.find_backup(&mut auth, &older.id).unwrap();
        assert_eq!(found, older);
    }

    #[test]
    fn test_find_backup_outside_prefix_pattern() {
        let (_, manager) = manager();
        let mut auth = StaticToken::ok();
        let sessions = collection(&[session("a", 5, "hello")]);

        let handle = manager.upload(&mut auth, &sessions, "notes.json").unwrap();
        assert!(manager.list_backups(&mut auth).unwrap().is_empty());

        let found = manager.find_backup(&mut auth, "notes.json").unwrap();
        assert_eq!(found.id, handle.id);
        assert_eq!(manager.download(&mut auth, &found).unwrap(), sessions);
    }

    #[test]
    fn test_download_corrupt_backup() {
        let (store, manager) = manager();
        let mut auth = StaticToken::ok();
        let folder = manager.resolve_workspace(&mut auth).unwrap();
        let handle = store.add_file(&folder, "chat_sessions_bad.json", b"{\"a\": 1");

        assert!(matches!(
            manager.download(&mut auth, &handle),
            Err(SyncError::CorruptBackup { name, .. }) if name == "chat_sessions_bad.json"
        ));
    }

    #[test]
    fn test_errors_are_typed_not_raised() {
        let (store, manager) = manager();

        let mut signed_out = StaticToken(Err(AuthError::NotAuthenticated));
        assert_eq!(
            manager.resolve_workspace(&mut signed_out),
            Err(SyncError::Auth(AuthError::NotAuthenticated))
        );

        store.fail_next(SyncError::Timeout);
        assert_eq!(
            manager.list_backups(&mut StaticToken::ok()),
            Err(SyncError::Timeout)
        );
        assert!(manager.list_backups(&mut StaticToken::ok()).is_ok());
    }

    #[test]
    fn test_merge_later_activity_wins_whole_session() {
        let local = collection(&[session("x", 10, "local")]);
        let remote = collection(&[session("x", 20, "remote")]);

        let (merged, report) = merge_with_report(&local, &remote);
        assert_eq!(merged.get("x").unwrap().messages()[0].content, "remote");
        assert_eq!(report.replaced, 1);

        let merged = merge_into(&remote, &local);
        assert_eq!(merged.get("x").unwrap().messages()[0].content, "remote");
    }

    #[test]
    fn test_merge_tie_keeps_local() {
        let local = collection(&[session("x", 10, "local")]);
        let remote = collection(&[session("x", 10, "remote")]);

        let (merged, report) = merge_with_report(&local, &remote);
        assert_eq!(merged.get("x").unwrap().messages()[0].content, "local");
        assert_eq!(report, MergeReport { added: 0, replaced: 0, kept: 1 });
    }

    #[test]
    fn test_merge_commutative_on_disjoint_keys() {
        let a = collection(&[session("a1", 1, "x"), session("a2", 9, "y")]);
        let b = collection(&[session("b1", 4, "z")]);

        assert_eq!(merge_into(&a, &b), merge_into(&b, &a));
        assert_eq!(merge_into(&a, &b).len(), 3);
        assert_eq!(merge_with_report(&a, &b).1.added, 1);
    }

    #[test]
    fn test_merge_with_empty() {
        let a = collection(&[session("a1", 1, "x")]);
        let empty = SessionCollection::new();

        assert_eq!(merge_into(&a, &empty), a);
        assert_eq!(merge_into(&empty, &a), a);
    }
}
