//! Session store - the in-memory session collection and its durable copy.

use chrono::{DateTime, Utc};

use crate::domain::{
    derive_session_id, AppError, ChatMessage, ChatSession, Result, SessionCollection, UserContext,
};
use crate::infrastructure::LocalStorage;

/// Owns the session collection for one process.
///
/// Mutations happen in memory; `save` and `delete_session` write the whole
/// collection through to local storage.
pub struct SessionStore {
    storage: LocalStorage,
    sessions: SessionCollection,
}

impl SessionStore {
    /// Loads whatever local storage holds. Never fails.
    #[must_use]
    pub fn open(storage: LocalStorage) -> Self {
        let sessions = storage.load();
        tracing::debug!(sessions = sessions.len(), "Session store opened");
        Self { storage, sessions }
    }

    #[must_use]
    pub const fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    #[must_use]
    pub const fn collection(&self) -> &SessionCollection {
        &self.sessions
    }

    /// Creates an empty session owned by `owner`. Not persisted until saved.
    pub fn create_session(&mut self, owner: &UserContext) -> String {
        self.create_session_at(owner, Utc::now(), None)
    }

    /// Creates a session as of `now`, optionally with an explicit name.
    ///
    /// Ids derive from the owner and creation time; a collision with an
    /// existing id gets a numeric suffix.
    pub fn create_session_at(
        &mut self,
        owner: &UserContext,
        now: DateTime<Utc>,
        name: Option<&str>,
    ) -> String {
        let base = derive_session_id(owner, now);
        let mut id = base.clone();
        let mut suffix = 2_u32;
        while self.sessions.contains(&id) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| ChatSession::default_name(now), String::from);

        self.sessions
            .insert(ChatSession::new(id.clone(), name, owner.clone(), now));
        tracing::debug!(session = %id, "Session created");
        id
    }

    /// Appends a message to a session, moving its `last_activity` forward.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if no session has this id.
    pub fn append_message(&mut self, session_id: &str, message: ChatMessage) -> Result<()> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::not_found(session_id))?;
        session.push(message);
        Ok(())
    }

    /// Writes the current collection to local storage.
    ///
    /// # Errors
    /// Returns error if the collection cannot be written.
    pub fn save(&self) -> Result<()> {
        self.storage.save(&self.sessions)
    }

    /// Removes a session and persists the result.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if absent, or a storage error.
    pub fn delete_session(&mut self, session_id: &str) -> Result<ChatSession> {
        let removed = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| AppError::not_found(session_id))?;

        if let Err(e) = self.save() {
            self.sessions.insert(removed);
            return Err(e);
        }

        tracing::info!(session = %session_id, "Session deleted");
        Ok(removed)
    }

    /// Sessions, most recently active first.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<&ChatSession> {
        self.sessions.sorted_by_activity()
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<&ChatSession> {
        self.sessions.get(session_id)
    }

    /// Resolves user input to a session id.
    ///
    /// Accepts a full id, a 1-based position in [`list_sessions`](Self::list_sessions),
    /// or a unique id prefix.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if nothing matches, `InvalidData` if a prefix
    /// is ambiguous.
    pub fn resolve_id(&self, input: &str) -> Result<String> {
        let input = input.trim();
        if self.sessions.contains(input) {
            return Ok(input.to_string());
        }

        let listed = self.list_sessions();

        if let Ok(number) = input.parse::<usize>() {
            return number
                .checked_sub(1)
                .and_then(|i| listed.get(i))
                .map(|s| s.id().to_string())
                .ok_or_else(|| AppError::InvalidData {
                    message: format!("Number {number} is out of range (1-{})", listed.len()),
                });
        }

        let matches: Vec<&str> = listed
            .iter()
            .map(|s| s.id())
            .filter(|id| !input.is_empty() && id.starts_with(input))
            .collect();

        match matches.as_slice() {
            [id] => Ok((*id).to_string()),
            [] => Err(AppError::not_found(input)),
            _ => Err(AppError::InvalidData {
                message: format!("'{input}' matches {} sessions", matches.len()),
            }),
        }
    }

    /// Renames a session in memory.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if absent, `InvalidData` for an empty name.
    pub fn rename_session(&mut self, session_id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidData {
                message: "session name cannot be empty".into(),
            });
        }

        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::not_found(session_id))?
            .set_name(name);
        Ok(())
    }

    /// Swaps in a whole collection, e.g. after merging a remote backup.
    pub fn replace_collection(&mut self, sessions: SessionCollection) {
        self.sessions = sessions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, SessionStore) {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("s.db"), dir.path().join("s.json"));
        (dir, SessionStore::open(storage))
    }

    fn owner() -> UserContext {
        UserContext::new("Jane", "Manager", "Ops")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_ids_unique_for_identical_owner_and_time() {
        let (_dir, mut store) = store();
        let ids: Vec<String> = (0..5)
            .map(|_| store.create_session_at(&owner(), at(0), None))
            .collect();

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(store.collection().len(), 5);
    }

    #[test]
    fn test_ids_unique_for_rapid_creation() {
        let (_dir, mut store) = store();
        let ids: HashSet<String> = (0..50).map(|_| store.create_session(&owner())).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_create_does_not_persist_until_save() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("s.db");
        let json = dir.path().join("s.json");

        let mut store = SessionStore::open(LocalStorage::new(db.clone(), json.clone()));
        let id = store.create_session_at(&owner(), at(0), Some("Planning"));
        assert_eq!(store.get(&id).unwrap().name(), "Planning");
        assert!(SessionStore::open(LocalStorage::new(db.clone(), json.clone()))
            .collection()
            .is_empty());

        store.save().unwrap();
        let reopened = SessionStore::open(LocalStorage::new(db, json));
        assert_eq!(reopened.collection(), store.collection());
    }

    #[test]
    fn test_append_updates_last_activity() {
        let (_dir, mut store) = store();
        let id = store.create_session_at(&owner(), at(0), None);

        store
            .append_message(&id, ChatMessage::new(Role::User, "hi", at(30)))
            .unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.last_activity(), at(30));
    }

    #[test]
    fn test_append_to_missing_session() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.append_message("nope", ChatMessage::new(Role::User, "hi", Utc::now())),
            Err(AppError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_persists_and_reports_missing() {
        let (dir, mut store) = store();
        let keep = store.create_session_at(&owner(), at(0), None);
        let gone = store.create_session_at(&owner(), at(1), None);
        store.save().unwrap();

        store.delete_session(&gone).unwrap();
        assert!(matches!(
            store.delete_session(&gone),
            Err(AppError::SessionNotFound { .. })
        ));

        let reopened = SessionStore::open(LocalStorage::new(
            dir.path().join("s.db"),
            dir.path().join("s.json"),
        ));
        assert!(reopened.get(&keep).is_some());
        assert!(reopened.get(&gone).is_none());
    }

    #[test]
    fn test_list_sorted_by_activity_then_id() {
        let (_dir, mut store) = store();
        let old = store.create_session_at(&owner(), at(0), None);
        let newer = store.create_session_at(&owner(), at(10), None);
        store
            .append_message(&old, ChatMessage::new(Role::User, "bump", at(20)))
            .unwrap();

        let listed: Vec<&str> = store.list_sessions().into_iter().map(ChatSession::id).collect();
        assert_eq!(listed, [old.as_str(), newer.as_str()]);
    }

    #[test]
    fn test_resolve_id_by_index_prefix_and_full_id() {
        let (_dir, mut store) = store();
        let first = store.create_session_at(&owner(), at(0), None);
        let second = store.create_session_at(&UserContext::new("Bob", "Dev", "Core"), at(5), None);

        assert_eq!(store.resolve_id("1").unwrap(), second);
        assert_eq!(store.resolve_id("2").unwrap(), first);
        assert_eq!(store.resolve_id(&first).unwrap(), first);
        assert_eq!(store.resolve_id("bob").unwrap(), second);
        assert!(store.resolve_id("3").is_err());
        assert!(store.resolve_id("0").is_err());
        assert!(matches!(
            store.resolve_id("zzz"),
            Err(AppError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let (_dir, mut store) = store();
        store.create_session_at(&owner(), at(0), None);
        store.create_session_at(&owner(), at(0) + Duration::hours(1), None);

        assert!(matches!(
            store.resolve_id("jane"),
            Err(AppError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_colliding_ids_resolve_exactly() {
        let (_dir, mut store) = store();
        let base = store.create_session_at(&owner(), at(0), None);
        let suffixed = store.create_session_at(&owner(), at(0), None);
        assert_eq!(suffixed, format!("{base}_2"));

        assert_eq!(store.resolve_id(&base).unwrap(), base);
        assert_eq!(store.resolve_id(&suffixed).unwrap(), suffixed);
    }

    #[test]
    fn test_rename_session() {
        let (_dir, mut store) = store();
        let id = store.create_session_at(&owner(), at(0), None);
        assert_eq!(store.get(&id).unwrap().name(), "Chat 2025-10-09 08:53");

        store.rename_session(&id, "  Quarterly plan ").unwrap();
        assert_eq!(store.get(&id).unwrap().name(), "Quarterly plan");
        assert!(store.rename_session(&id, "   ").is_err());
        assert!(store.rename_session("nope", "x").is_err());
    }
}
