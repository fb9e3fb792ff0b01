//! Domain layer - core types, configuration and error taxonomy.
//!
//! This layer contains pure domain models, the error types and the traits
//! that external collaborators are reached through, without any I/O.

pub mod config;
pub mod credential;
pub mod error;
pub mod models;
pub mod ports;
pub mod request;

pub use config::{AppConfig, AuthConfig, PathConfig, ResponderConfig, SyncConfig, UserConfig};
pub use credential::{ClientDescriptor, Credential, TokenGrant, DRIVE_FILE_SCOPE};
pub use error::{AppError, AuthError, ResponderError, Result, SyncError};
pub use models::{
    derive_session_id, ChatMessage, ChatSession, RemoteFileHandle, Role, SessionCollection,
    UserContext,
};
pub use ports::{AccessTokenProvider, ObjectStore, Responder, TokenEndpoint};
pub use request::{ContextTurn, ResponderRequest};
