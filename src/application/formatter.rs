//! Output formatting for sessions and backups.
//!
//! Supports multiple output formats: Markdown, JSON, and table view.

use std::fmt::Write;
use std::path::Path;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{ChatMessage, ChatSession, RemoteFileHandle, Role};

use super::sync_manager::MergeReport;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable Markdown format.
    #[default]
    Markdown,
    /// JSON format for programmatic use.
    Json,
    /// Compact table listing.
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {s}. Use: markdown, json, table")),
        }
    }
}

/// Formats a session as Markdown, optionally only its last `last` messages.
pub fn format_session_markdown(session: &ChatSession, last: Option<usize>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {} ({})\n", session.name(), session.id());
    let owner = session.owner();
    let _ = writeln!(out, "**Owner:** {} ({}, {})", owner.name, owner.role, owner.team);
    let _ = writeln!(
        out,
        "**Created:** {}",
        session.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "**Last activity:** {}",
        session.last_activity().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "**Messages:** {}\n", session.message_count());
    out.push_str("---\n\n");

    for message in tail(session.messages(), last) {
        let role = match message.role {
            Role::User => "👤 **User**",
            Role::Assistant => "🤖 **Assistant**",
        };
        let _ = writeln!(out, "### {role}\n");
        let _ = writeln!(out, "*{}*\n", message.timestamp.format("%H:%M:%S"));
        out.push_str(&message.content);
        out.push_str("\n\n---\n\n");
    }

    out
}

/// Formats sessions as JSON in their stored shape.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_sessions_json(sessions: &[&ChatSession]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(sessions)
}

/// Formats a numbered table listing of sessions.
pub fn format_sessions_table(sessions: &[&ChatSession]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "ID", "Name", "Last activity", "Msgs", "Preview"]);

    for (i, session) in sessions.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            session.id().to_string(),
            truncate(session.name(), 28),
            session
                .last_activity()
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            session.message_count().to_string(),
            truncate(session.preview(), 35),
        ]);
    }

    table.to_string()
}

/// Formats a table of remote backups.
pub fn format_backups_table(backups: &[RemoteFileHandle]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "ID", "Modified", "Size"]);

    for backup in backups {
        table.add_row(vec![
            backup.name.clone(),
            backup.id.clone(),
            backup.modified_at.format("%Y-%m-%d %H:%M").to_string(),
            format_size(backup.size_bytes),
        ]);
    }

    table.to_string()
}

/// One-line summary of a merge.
pub fn format_merge_report(report: &MergeReport) -> String {
    format!(
        "{} added, {} replaced, {} kept",
        report.added.to_string().green(),
        report.replaced.to_string().yellow(),
        report.kept.to_string().cyan()
    )
}

/// What happens to a fresh sign-in once the process exits.
pub fn format_sign_in_note(exported: bool, path: &Path) -> String {
    if exported {
        format!("Credential saved to {}", path.display())
    } else {
        "Credential was not saved and is discarded when hookchat exits; \
         run `hookchat auth login --export` to stay signed in"
            .to_string()
    }
}

/// Formats bytes as human-readable size.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn tail(messages: &[ChatMessage], last: Option<usize>) -> &[ChatMessage] {
    match last {
        Some(n) if n < messages.len() => &messages[messages.len() - n..],
        _ => messages,
    }
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
