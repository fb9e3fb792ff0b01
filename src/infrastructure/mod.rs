//! Infrastructure layer - external adapters (database, filesystem, HTTP).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod atomic_file;
pub mod config;
pub mod credential_file;
pub mod drive_client;
pub mod http;
pub mod local_storage;
pub mod responder_client;
pub mod token_client;

pub use config::{config_file_path, ensure_config_exists, load_config};
pub use credential_file::CredentialFile;
pub use drive_client::DriveClient;
pub use local_storage::LocalStorage;
pub use responder_client::WebhookResponder;
pub use token_client::HttpTokenEndpoint;
