//! Boundaries to external collaborators.
//!
//! Infrastructure adapters implement these; the application layer only sees
//! the traits, so tests can substitute in-memory fakes.

use super::credential::{ClientDescriptor, Credential, TokenGrant};
use super::error::{AuthError, ResponderError, SyncError};
use super::models::RemoteFileHandle;
use super::request::ResponderRequest;

/// File-storage API of the remote object store.
///
/// Every call takes a fresh bearer token; implementations must not cache one.
pub trait ObjectStore {
    /// Folders named exactly `name`.
    fn find_folders(&self, token: &str, name: &str) -> Result<Vec<RemoteFileHandle>, SyncError>;

    /// Creates a folder and returns its handle.
    fn create_folder(&self, token: &str, name: &str) -> Result<RemoteFileHandle, SyncError>;

    /// Files named exactly `name` inside `folder_id`.
    fn find_files(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<Vec<RemoteFileHandle>, SyncError>;

    /// Creates a file with `content` inside `folder_id`.
    fn create_file(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError>;

    /// Replaces the content of an existing file.
    fn update_file(
        &self,
        token: &str,
        file_id: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError>;

    /// All files inside `folder_id`.
    fn list_files(&self, token: &str, folder_id: &str)
        -> Result<Vec<RemoteFileHandle>, SyncError>;

    /// Raw content of a file.
    fn download(&self, token: &str, file_id: &str) -> Result<Vec<u8>, SyncError>;
}

/// OAuth token endpoint.
pub trait TokenEndpoint {
    /// Exchanges an authorization code (with its PKCE verifier) for tokens.
    fn exchange_code(
        &self,
        client: &ClientDescriptor,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError>;

    /// Obtains a new access token using the credential's refresh token.
    fn refresh(&self, credential: &Credential, refresh_token: &str)
        -> Result<TokenGrant, AuthError>;
}

/// Supplies a currently-valid access token, refreshing when needed.
pub trait AccessTokenProvider {
    /// # Errors
    /// Returns `AuthError` when no usable credential can be produced.
    fn access_token(&mut self) -> Result<String, AuthError>;
}

/// The AI responder webhook.
pub trait Responder {
    /// Sends `request` and returns the raw reply body.
    ///
    /// # Errors
    /// Returns `ResponderError` on transport failure or a non-success status.
    fn respond(&self, request: &ResponderRequest) -> Result<Vec<u8>, ResponderError>;
}
