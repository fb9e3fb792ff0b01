//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;

/// hookchat - chat with a webhook-backed assistant, keep sessions, back them up.
///
/// Quick start: hookchat init | new | send 1 "hello" | show 1 --last 4
#[derive(Parser, Debug)]
#[command(name = "hookchat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format: markdown, json, or table.
    #[arg(short, long, default_value = "markdown")]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config file if none exists.
    Init,

    /// Show the files hookchat reads and writes.
    Paths,

    /// Start a new chat session.
    New {
        /// Session name (defaults to "Chat <date time>").
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List sessions, most recently active first.
    List {
        /// Maximum number of sessions to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a session's messages.
    Show {
        /// Session ID (full or prefix) or number from `list`.
        session: String,

        /// Show only the last N messages.
        #[arg(short, long)]
        last: Option<usize>,
    },

    /// Send a message and print the reply.
    Send {
        /// Session ID (full or prefix) or number from `list`.
        session: String,

        /// Message text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Rename a session.
    Rename {
        /// Session ID (full or prefix) or number from `list`.
        session: String,

        /// New name.
        name: String,
    },

    /// Delete a session.
    Delete {
        /// Session ID (full or prefix) or number from `list`.
        session: String,
    },

    /// Sign in to remote storage.
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Back up sessions to remote storage and restore them.
    #[command(subcommand)]
    Sync(SyncCommands),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in with an installed-app OAuth client.
    Login {
        /// Client secrets JSON (defaults to the configured path).
        #[arg(long)]
        secrets: Option<PathBuf>,

        /// Save the credential so later runs stay signed in. Without it the
        /// sign-in is discarded when the command exits.
        #[arg(long)]
        export: bool,
    },

    /// Show sign-in state.
    Status,

    /// Forget the credential and delete any exported copy.
    Logout,
}

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Upload all sessions now.
    Push {
        /// Backup file name (defaults to the configured one).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show the remote backup folder, creating it if needed.
    Workspace,

    /// List remote backups, newest first.
    Backups,

    /// Download a backup and merge it into local sessions.
    Pull {
        /// Backup file name or remote id (defaults to the newest backup).
        #[arg(long, value_name = "NAME_OR_ID")]
        file: Option<String>,
    },
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}
