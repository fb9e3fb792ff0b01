//! Durable local storage for the session collection.
//!
//! The collection is kept in two mirrored forms: a `SQLite` database (the
//! native form, replaced inside one transaction) and a JSON file in the exact
//! shape uploaded as a remote backup (replaced via temp file + rename).
//! Loading never fails: a missing or unreadable native form falls back to the
//! JSON mirror, and failing both yields an empty collection.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::domain::{
    AppConfig, AppError, ChatMessage, ChatSession, Result, Role, SessionCollection, UserContext,
};

use super::atomic_file::write_atomic;

/// Local storage repository backed by `SQLite` plus a JSON mirror.
pub struct LocalStorage {
    db_path: PathBuf,
    json_path: PathBuf,
}

/// Raw `sessions` row before timestamp parsing.
struct SessionRow {
    id: String,
    name: String,
    owner: UserContext,
    created_at: String,
    last_activity: String,
    message_count: i64,
}

impl LocalStorage {
    #[must_use]
    pub const fn new(db_path: PathBuf, json_path: PathBuf) -> Self {
        Self { db_path, json_path }
    }

    /// Storage at the locations named by `config`.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.storage_db_path(), config.json_mirror_path())
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    /// Opens the database and makes sure the schema exists.
    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create storage directory", e))?;
        }

        let conn = Connection::open(&self.db_path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(AppError::database)?;

        Self::init_schema(&conn)?;

        Ok(conn)
    }

    /// Initialize database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                owner_role TEXT NOT NULL,
                owner_team TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                message_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (session_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_activity
                ON sessions(last_activity DESC);
            ",
        )
        .map_err(AppError::database)
    }

    /// Writes the whole collection to both forms.
    ///
    /// The native form is replaced in a single transaction; the JSON mirror is
    /// written to a temp file and renamed. A crash at any point leaves the
    /// previous copy of each form intact.
    ///
    /// # Errors
    /// Returns error if either form cannot be written.
    pub fn save(&self, collection: &SessionCollection) -> Result<()> {
        let mut conn = match self.connect() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Session database unusable, recreating it");
                self.quarantine();
                self.connect()?
            }
        };

        Self::write_native(&mut conn, collection)?;

        let json = collection.to_json().map_err(AppError::json_parse)?;
        write_atomic(&self.json_path, &json)?;

        tracing::debug!(
            sessions = collection.len(),
            messages = collection.message_count(),
            "Session collection saved"
        );

        Ok(())
    }

    fn write_native(conn: &mut Connection, collection: &SessionCollection) -> Result<()> {
        let tx = conn.transaction().map_err(AppError::database)?;

        tx.execute_batch("DELETE FROM messages; DELETE FROM sessions;")
            .map_err(AppError::database)?;

        {
            let mut insert_session = tx
                .prepare(
                    r"
                INSERT INTO sessions
                    (id, name, owner_name, owner_role, owner_team,
                     created_at, last_activity, message_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                )
                .map_err(AppError::database)?;

            let mut insert_message = tx
                .prepare(
                    r"
                INSERT INTO messages (session_id, position, role, content, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                )
                .map_err(AppError::database)?;

            for session in collection.iter() {
                let owner = session.owner();
                insert_session
                    .execute(params![
                        session.id(),
                        session.name(),
                        &owner.name,
                        &owner.role,
                        &owner.team,
                        format_time(session.created_at()),
                        format_time(session.last_activity()),
                        to_i64(session.message_count()),
                    ])
                    .map_err(AppError::database)?;

                for (position, message) in session.messages().iter().enumerate() {
                    insert_message
                        .execute(params![
                            session.id(),
                            to_i64(position),
                            message.role.as_str(),
                            &message.content,
                            format_time(message.timestamp),
                        ])
                        .map_err(AppError::database)?;
                }
            }
        }

        tx.commit().map_err(AppError::database)
    }

    /// Reads the collection, degrading to the JSON mirror and then to empty.
    #[must_use]
    pub fn load(&self) -> SessionCollection {
        if self.db_path.exists() {
            match self.load_native() {
                Ok(collection) => {
                    tracing::debug!(sessions = collection.len(), "Loaded sessions from database");
                    return collection;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.db_path.display(),
                        error = %e,
                        "Session database unreadable, falling back to JSON mirror"
                    );
                    self.quarantine();
                }
            }
        }

        match self.load_json_mirror() {
            Ok(Some(collection)) => {
                tracing::info!(sessions = collection.len(), "Loaded sessions from JSON mirror");
                collection
            }
            Ok(None) => SessionCollection::new(),
            Err(e) => {
                tracing::warn!(
                    path = %self.json_path.display(),
                    error = %e,
                    "JSON mirror unreadable, starting with no sessions"
                );
                SessionCollection::new()
            }
        }
    }

    fn load_native(&self) -> Result<SessionCollection> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                r"
            SELECT id, name, owner_name, owner_role, owner_team,
                   created_at, last_activity, message_count
            FROM sessions
            ",
            )
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner: UserContext {
                        name: row.get(2)?,
                        role: row.get(3)?,
                        team: row.get(4)?,
                    },
                    created_at: row.get(5)?,
                    last_activity: row.get(6)?,
                    message_count: row.get(7)?,
                })
            })
            .map_err(AppError::database)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)?;

        let mut messages = Self::load_messages(&conn)?;
        let mut collection = SessionCollection::new();

        for row in rows {
            let session_messages = messages.remove(&row.id).unwrap_or_default();
            if usize::try_from(row.message_count).ok() != Some(session_messages.len()) {
                return Err(AppError::InvalidData {
                    message: format!(
                        "session {} declares {} messages but has {}",
                        row.id,
                        row.message_count,
                        session_messages.len()
                    ),
                });
            }

            collection.insert(ChatSession::from_parts(
                row.id,
                row.name,
                row.owner,
                parse_time(&row.created_at)?,
                parse_time(&row.last_activity)?,
                session_messages,
            ));
        }

        if !messages.is_empty() {
            return Err(AppError::InvalidData {
                message: format!("{} orphaned message groups", messages.len()),
            });
        }

        Ok(collection)
    }

    /// Messages grouped by session id, in conversation order.
    fn load_messages(conn: &Connection) -> Result<HashMap<String, Vec<ChatMessage>>> {
        let mut stmt = conn
            .prepare(
                r"
            SELECT session_id, role, content, timestamp
            FROM messages
            ORDER BY session_id, position ASC
            ",
            )
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(AppError::database)?;

        let mut grouped: HashMap<String, Vec<ChatMessage>> = HashMap::new();
        for row in rows {
            let (session_id, role, content, timestamp) = row.map_err(AppError::database)?;
            let role: Role = role
                .parse()
                .map_err(|message| AppError::InvalidData { message })?;
            grouped
                .entry(session_id)
                .or_default()
                .push(ChatMessage::new(role, content, parse_time(&timestamp)?));
        }

        Ok(grouped)
    }

    fn load_json_mirror(&self) -> Result<Option<SessionCollection>> {
        if !self.json_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&self.json_path)
            .map_err(|e| AppError::io("Failed to read JSON mirror", e))?;
        SessionCollection::from_json(&data)
            .map(Some)
            .map_err(AppError::json_parse)
    }

    /// Moves an unreadable database aside so the next save starts fresh.
    fn quarantine(&self) {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let file_name = self
            .db_path
            .file_name()
            .map_or_else(|| "sessions.db".into(), |n| n.to_string_lossy());
        let target = self
            .db_path
            .with_file_name(format!("{file_name}.corrupt-{stamp}"));

        match fs::rename(&self.db_path, &target) {
            Ok(()) => {
                for suffix in ["-wal", "-shm"] {
                    let _ = fs::remove_file(format!("{}{suffix}", self.db_path.display()));
                }
                tracing::warn!(moved_to = %target.display(), "Quarantined session database");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to quarantine session database");
            }
        }
    }
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::InvalidData {
            message: format!("invalid timestamp '{s}': {e}"),
        })
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
