//! hookchat - a terminal chat client for a webhook-backed assistant.
//!
//! Sessions are kept in a local `SQLite` store with a JSON mirror, and can be
//! backed up to (and merged back from) a remote folder after an OAuth sign-in.
//!
//! Quick start:
//!   hookchat init                        # write ~/.hookchat/config.toml
//!   hookchat new --name "Support"        # start a session
//!   hookchat send 1 "hello"              # talk to the assistant
//!   hookchat show 1 --last 4             # read the conversation
//!   hookchat auth login --export         # sign in for cloud backup
//!   hookchat sync push                   # upload all sessions

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::io::{BufRead, Write};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_backups_table, format_merge_report, format_session_markdown, format_sessions_json,
    format_sessions_table, format_sign_in_note, App, AuthState, OutputFormat, SyncStatus,
};
use cli::{AuthCommands, Cli, Commands, SyncCommands};
use domain::{AppConfig, AppError};
use infrastructure::{config_file_path, ensure_config_exists, load_config};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::Paths => cmd_paths(&load_config()?),
        command => {
            let mut app = App::from_config(load_config()?)?;
            dispatch(&mut app, command, format)
        }
    }
}

fn dispatch(app: &mut App, command: Commands, format: OutputFormat) -> domain::Result<()> {
    match command {
        Commands::New { name } => cmd_new(app, name.as_deref()),
        Commands::List { limit } => cmd_list(app, limit, format),
        Commands::Show { session, last } => cmd_show(app, &session, last, format),
        Commands::Send { session, text } => cmd_send(app, &session, &text.join(" ")),
        Commands::Rename { session, name } => cmd_rename(app, &session, &name),
        Commands::Delete { session } => cmd_delete(app, &session),
        Commands::Auth(AuthCommands::Login { secrets, export }) => {
            cmd_login(app, secrets.as_deref(), export)
        }
        Commands::Auth(AuthCommands::Status) => {
            cmd_auth_status(app);
            Ok(())
        }
        Commands::Auth(AuthCommands::Logout) => cmd_logout(app),
        Commands::Sync(SyncCommands::Push { name }) => cmd_push(app, name.as_deref()),
        Commands::Sync(SyncCommands::Workspace) => cmd_workspace(app),
        Commands::Sync(SyncCommands::Backups) => cmd_backups(app),
        Commands::Sync(SyncCommands::Pull { file }) => cmd_pull(app, file.as_deref()),
        Commands::Init | Commands::Paths => Ok(()),
    }
}

/// Write the default config file.
fn cmd_init() -> domain::Result<()> {
    let (path, created) = ensure_config_exists()?;
    if created {
        println!("{} Created {}", "✓".green().bold(), path.display());
        println!("   Set responder.webhook_url, then run: hookchat new");
    } else {
        println!("Config already exists: {}", path.display());
    }
    Ok(())
}

/// Show every path in use.
fn cmd_paths(config: &AppConfig) -> domain::Result<()> {
    println!("{}", "📂 hookchat paths".bold());
    println!();
    println!("  config          {}", config_file_path().display());
    println!("  data dir        {}", config.data_dir().display());
    println!("  sessions db     {}", config.storage_db_path().display());
    println!("  json mirror     {}", config.json_mirror_path().display());
    println!("  client secrets  {}", config.client_secrets_path().display());
    println!("  credential      {}", config.credential_file_path().display());
    Ok(())
}

fn cmd_new(app: &mut App, name: Option<&str>) -> domain::Result<()> {
    let (id, status) = app.create_session(name)?;
    let session = app.session(&id)?;
    println!("{} {} → {}", "✓".green().bold(), session.name().cyan(), id);
    print_sync_status(&status);
    Ok(())
}

fn cmd_list(app: &App, limit: usize, format: OutputFormat) -> domain::Result<()> {
    let mut sessions = app.sessions().list_sessions();
    sessions.truncate(limit);

    if sessions.is_empty() {
        println!("No sessions yet. Start one with: hookchat new");
        return Ok(());
    }

    let output = match format {
        OutputFormat::Json => format_sessions_json(&sessions).map_err(AppError::json_parse)?,
        OutputFormat::Markdown | OutputFormat::Table => format_sessions_table(&sessions),
    };
    println!("{output}");
    Ok(())
}

fn cmd_show(
    app: &App,
    input: &str,
    last: Option<usize>,
    format: OutputFormat,
) -> domain::Result<()> {
    let id = app.resolve_session(input)?;
    let session = app.session(&id)?;

    let output = match format {
        OutputFormat::Markdown => format_session_markdown(session, last),
        OutputFormat::Json => format_sessions_json(&[session]).map_err(AppError::json_parse)?,
        OutputFormat::Table => format_sessions_table(&[session]),
    };
    println!("{output}");
    Ok(())
}

fn cmd_send(app: &mut App, input: &str, text: &str) -> domain::Result<()> {
    let id = app.resolve_session(input)?;
    let outcome = app.send_message(&id, text)?;

    if outcome.answered {
        println!("{} {}", "🤖".bold(), outcome.reply);
    } else {
        println!("{} {}", "⚠".yellow().bold(), outcome.reply.yellow());
    }
    print_sync_status(&outcome.sync);
    Ok(())
}

fn cmd_rename(app: &mut App, input: &str, name: &str) -> domain::Result<()> {
    let id = app.resolve_session(input)?;
    let status = app.rename_session(&id, name)?;
    println!("{} Renamed {} to {}", "✓".green().bold(), id, name.trim().cyan());
    print_sync_status(&status);
    Ok(())
}

fn cmd_delete(app: &mut App, input: &str) -> domain::Result<()> {
    let id = app.resolve_session(input)?;
    let (removed, status) = app.delete_session(&id)?;
    println!(
        "{} Deleted {} ({} messages)",
        "✓".green().bold(),
        removed.name().cyan(),
        removed.message_count()
    );
    print_sync_status(&status);
    Ok(())
}

fn cmd_login(app: &mut App, secrets: Option<&std::path::Path>, export: bool) -> domain::Result<()> {
    let url = app.begin_sign_in(secrets)?;

    println!("{}", "🔐 Sign in to remote storage".bold());
    println!();
    println!("1. Open this URL and approve access:");
    println!();
    println!("   {url}");
    println!();
    println!("2. Paste the code (or the whole URL you were redirected to):");
    print!("> ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::io("Failed to write prompt", e))?;

    let mut input = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| AppError::io("Failed to read authorization code", e))?;

    app.complete_sign_in(&input, export)?;

    println!("{} Signed in", "✓".green().bold());
    println!("   {}", format_sign_in_note(export, app.credential_path()));
    Ok(())
}

fn cmd_auth_status(app: &App) {
    let state = app.auth_state();
    let label = match state {
        AuthState::Authorized => state.to_string().green(),
        AuthState::AwaitingConsent => state.to_string().yellow(),
        AuthState::Unauthenticated => state.to_string().red(),
    };
    println!("Remote storage: {label}");

    if let Some(credential) = app.auth().credential() {
        println!(
            "  Access token expires: {}",
            credential.expiry.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  Scopes: {}", credential.scopes.join(" "));
        println!(
            "  Refresh token: {}",
            if credential.refresh_token.is_some() { "yes" } else { "no" }
        );
    }
    if app.credential_exported() {
        println!("  Exported to {}", app.credential_path().display());
    }
    println!(
        "  Backup on save: {}",
        if app.config().sync.enabled && app.config().sync.upload_on_save {
            "on"
        } else {
            "off"
        }
    );
}

fn cmd_logout(app: &mut App) -> domain::Result<()> {
    let removed = app.sign_out()?;
    println!("{} Signed out", "✓".green().bold());
    if removed {
        println!("   Removed {}", app.credential_path().display());
    }
    Ok(())
}

fn cmd_push(app: &mut App, name: Option<&str>) -> domain::Result<()> {
    let count = app.sessions().collection().len();
    let handle = app.push_backup(name)?;
    println!(
        "{} Uploaded {} sessions to {}",
        "☁".green().bold(),
        count,
        handle.name.cyan()
    );
    Ok(())
}

fn cmd_workspace(app: &mut App) -> domain::Result<()> {
    let folder_id = app.resolve_workspace()?;
    println!(
        "{} {} (id {})",
        "📁".bold(),
        app.config().sync.folder_name.cyan(),
        folder_id
    );
    Ok(())
}

fn cmd_backups(app: &mut App) -> domain::Result<()> {
    let backups = app.list_backups()?;
    if backups.is_empty() {
        println!("No backups yet. Upload one with: hookchat sync push");
        return Ok(());
    }
    println!("{}", format_backups_table(&backups));
    Ok(())
}

fn cmd_pull(app: &mut App, file: Option<&str>) -> domain::Result<()> {
    let outcome = app.pull_backup(file)?;
    println!(
        "{} Merged {}: {}",
        "✓".green().bold(),
        outcome.backup.name.cyan(),
        format_merge_report(&outcome.report)
    );
    Ok(())
}

fn print_sync_status(status: &SyncStatus) {
    match status {
        SyncStatus::Skipped => {}
        SyncStatus::Uploaded { name } => {
            println!("   {} backed up to {}", "☁".green(), name);
        }
        SyncStatus::Failed { message } => {
            println!("   {} {}", "☁".yellow(), message.yellow());
        }
    }
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
