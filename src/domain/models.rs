//! Domain models for chat sessions.
//!
//! A `SessionCollection` maps session ids to `ChatSession`s; each session holds
//! its messages in conversation order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Reply from the AI responder.
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// A single chat turn. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Assistant message stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Utc::now())
    }
}

/// Who a session belongs to. Opaque beyond id derivation and the responder payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub name: String,
    pub role: String,
    pub team: String,
}

impl UserContext {
    #[must_use]
    pub fn new(name: impl Into<String>, role: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            team: team.into(),
        }
    }
}

/// Derives a session id from the owner and a creation-time salt.
///
/// Format: `{name-slug}_{%Y%m%dT%H%M%S%6f}_{8 hex of sha256(owner)}`.
/// The same inputs always produce the same id.
#[must_use]
pub fn derive_session_id(owner: &UserContext, created_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(owner.role.as_bytes());
    hasher.update([0x1f]);
    hasher.update(owner.team.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();

    format!(
        "{}_{}_{short}",
        slugify(&owner.name),
        created_at.format("%Y%m%dT%H%M%S%6f")
    )
}

/// Lowercase ASCII slug; runs of other characters collapse to one `-`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug.to_string()
    }
}

/// A named, timestamped, ordered conversation owned by one user context.
///
/// Messages can only be appended, so `message_count()` always equals the
/// number of stored messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord", into = "SessionRecord")]
pub struct ChatSession {
    id: String,
    name: String,
    owner: UserContext,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Empty session; `last_activity` starts at `created_at`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner: UserContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner,
            created_at,
            last_activity: created_at,
            messages: Vec::new(),
        }
    }

    /// Rebuilds a session from stored parts.
    #[must_use]
    pub(crate) fn from_parts(
        id: String,
        name: String,
        owner: UserContext,
        created_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            id,
            name,
            owner,
            created_at,
            last_activity,
            messages,
        }
    }

    /// Default display name for a session created at `created_at`.
    #[must_use]
    pub fn default_name(created_at: DateTime<Utc>) -> String {
        format!("Chat {}", created_at.format("%Y-%m-%d %H:%M"))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn owner(&self) -> &UserContext {
        &self.owner
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Get the first user message as a preview.
    #[must_use]
    pub fn preview(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map_or("[Empty conversation]", |m| m.content.as_str())
    }

    /// Appends a message and moves `last_activity` forward to its timestamp.
    pub(crate) fn push(&mut self, message: ChatMessage) {
        if message.timestamp > self.last_activity {
            self.last_activity = message.timestamp;
        }
        self.messages.push(message);
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Serialized shape of a session, with an explicit message count.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    id: String,
    name: String,
    owner: UserContext,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: usize,
    messages: Vec<ChatMessage>,
}

impl TryFrom<SessionRecord> for ChatSession {
    type Error = String;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        if record.message_count != record.messages.len() {
            return Err(format!(
                "session {} declares {} messages but holds {}",
                record.id,
                record.message_count,
                record.messages.len()
            ));
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            owner: record.owner,
            created_at: record.created_at,
            last_activity: record.last_activity,
            messages: record.messages,
        })
    }
}

impl From<ChatSession> for SessionRecord {
    fn from(session: ChatSession) -> Self {
        Self {
            message_count: session.messages.len(),
            id: session.id,
            name: session.name,
            owner: session.owner,
            created_at: session.created_at,
            last_activity: session.last_activity,
            messages: session.messages,
        }
    }
}

/// Sessions keyed by id. Serializes as a JSON object `{id: session}`; this is
/// also the exact payload uploaded as a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ChatSession>",
    into = "BTreeMap<String, ChatSession>"
)]
pub struct SessionCollection {
    sessions: BTreeMap<String, ChatSession>,
}

impl SessionCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.get_mut(id)
    }

    /// Inserts a session under its own id, returning any session it replaced.
    pub fn insert(&mut self, session: ChatSession) -> Option<ChatSession> {
        self.sessions.insert(session.id.clone(), session)
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatSession> {
        self.sessions.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatSession> {
        self.sessions.values()
    }

    /// Sessions by `last_activity` descending, ties by id ascending.
    #[must_use]
    pub fn sorted_by_activity(&self) -> Vec<&ChatSession> {
        let mut sessions: Vec<&ChatSession> = self.sessions.values().collect();
        sessions.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    /// Total messages across all sessions.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.sessions.values().map(ChatSession::message_count).sum()
    }

    /// JSON form used for the mirror file and remote backups.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Parses the JSON form produced by [`SessionCollection::to_json`].
    ///
    /// # Errors
    /// Returns error if the payload is not a valid collection.
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl TryFrom<BTreeMap<String, ChatSession>> for SessionCollection {
    type Error = String;

    fn try_from(sessions: BTreeMap<String, ChatSession>) -> Result<Self, Self::Error> {
        if let Some((key, session)) = sessions.iter().find(|(key, s)| **key != s.id) {
            return Err(format!(
                "collection key {key} does not match session id {}",
                session.id
            ));
        }
        Ok(Self { sessions })
    }
}

impl From<SessionCollection> for BTreeMap<String, ChatSession> {
    fn from(collection: SessionCollection) -> Self {
        collection.sessions
    }
}

impl FromIterator<ChatSession> for SessionCollection {
    fn from_iter<I: IntoIterator<Item = ChatSession>>(iter: I) -> Self {
        let mut collection = Self::new();
        for session in iter {
            collection.insert(session);
        }
        collection
    }
}

/// A file in the remote object store. Fetched on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileHandle {
    pub id: String,
    pub name: String,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}
