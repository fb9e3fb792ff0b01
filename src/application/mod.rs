//! Application layer - use cases and orchestration.
//!
//! This layer holds the session store, the OAuth flow, remote sync and
//! reply normalization, and the `App` context that sequences them.

pub mod app;
pub mod auth_flow;
pub mod formatter;
pub mod normalizer;
pub mod session_store;
pub mod sync_manager;

#[cfg(test)]
pub mod testing;

pub use app::{App, PullOutcome, SendOutcome, SyncStatus};
pub use auth_flow::{AuthFlow, AuthState};
pub use formatter::{
    format_backups_table, format_merge_report, format_session_markdown, format_sessions_json,
    format_sessions_table, format_sign_in_note, OutputFormat,
};
pub use normalizer::{normalize, normalize_bytes, NO_RESPONSE_SENTINEL};
pub use session_store::SessionStore;
pub use sync_manager::{merge_into, merge_with_report, MergeReport, SyncManager};
