//! In-memory stand-ins for the external collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::{
    AccessTokenProvider, AuthError, ClientDescriptor, Credential, ObjectStore, RemoteFileHandle,
    Responder, ResponderError, ResponderRequest, SyncError, TokenEndpoint, TokenGrant,
};

pub fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access.into(),
        refresh_token: refresh.map(String::from),
        expires_in: Some(expires_in),
        scope: None,
    }
}

#[derive(Default)]
struct TokenScript {
    exchanges: VecDeque<Result<TokenGrant, AuthError>>,
    refreshes: VecDeque<Result<TokenGrant, AuthError>>,
    exchanged: Vec<(String, String)>,
    refresh_calls: usize,
}

/// Token endpoint answering from scripted results.
#[derive(Clone, Default)]
pub struct FakeTokenEndpoint(Rc<RefCell<TokenScript>>);

impl FakeTokenEndpoint {
    pub fn push_exchange(&self, result: Result<TokenGrant, AuthError>) {
        self.0.borrow_mut().exchanges.push_back(result);
    }

    pub fn push_refresh(&self, result: Result<TokenGrant, AuthError>) {
        self.0.borrow_mut().refreshes.push_back(result);
    }

    /// `(code, verifier)` for every exchange attempt.
    pub fn exchanged(&self) -> Vec<(String, String)> {
        self.0.borrow().exchanged.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.0.borrow().refresh_calls
    }
}

impl TokenEndpoint for FakeTokenEndpoint {
    fn exchange_code(
        &self,
        _client: &ClientDescriptor,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError> {
        let mut script = self.0.borrow_mut();
        script
            .exchanged
            .push((code.to_string(), code_verifier.to_string()));
        script
            .exchanges
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::exchange("unscripted exchange")))
    }

    fn refresh(&self, _credential: &Credential, _token: &str) -> Result<TokenGrant, AuthError> {
        let mut script = self.0.borrow_mut();
        script.refresh_calls += 1;
        script
            .refreshes
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::refresh("unscripted refresh")))
    }
}

/// Always hands out the same token (or error).
pub struct StaticToken(pub Result<String, AuthError>);

impl StaticToken {
    pub fn ok() -> Self {
        Self(Ok("token".into()))
    }
}

impl AccessTokenProvider for StaticToken {
    fn access_token(&mut self) -> Result<String, AuthError> {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub folder_id: Option<String>,
    pub handle: RemoteFileHandle,
    pub content: Vec<u8>,
}

#[derive(Default)]
struct RemoteState {
    files: Vec<StoredFile>,
    next_id: u32,
    clock: i64,
    fail_next: Option<SyncError>,
    folder_creates: usize,
}

impl RemoteState {
    fn tick(&mut self) -> (String, DateTime<Utc>) {
        self.next_id += 1;
        self.clock += 60;
        let at = Utc.timestamp_opt(1_760_000_000 + self.clock, 0).unwrap();
        (format!("id{}", self.next_id), at)
    }

    fn check(&mut self) -> Result<(), SyncError> {
        self.fail_next.take().map_or(Ok(()), Err)
    }
}

/// Remote object store kept in memory. Folders are files with no parent.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore(Rc<RefCell<RemoteState>>);

impl InMemoryObjectStore {
    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.0.borrow_mut().fail_next = Some(error);
    }

    pub fn add_folder(&self, name: &str, age: Duration) -> String {
        let mut state = self.0.borrow_mut();
        let (id, at) = state.tick();
        state.files.push(StoredFile {
            folder_id: None,
            handle: RemoteFileHandle {
                id: id.clone(),
                name: name.into(),
                modified_at: at - age,
                size_bytes: 0,
            },
            content: Vec::new(),
        });
        id
    }

    pub fn add_file(&self, folder_id: &str, name: &str, content: &[u8]) -> RemoteFileHandle {
        let mut state = self.0.borrow_mut();
        let (id, at) = state.tick();
        let handle = RemoteFileHandle {
            id,
            name: name.into(),
            modified_at: at,
            size_bytes: content.len() as u64,
        };
        state.files.push(StoredFile {
            folder_id: Some(folder_id.into()),
            handle: handle.clone(),
            content: content.to_vec(),
        });
        handle
    }

    pub fn files_named(&self, name: &str) -> Vec<StoredFile> {
        self.0
            .borrow()
            .files
            .iter()
            .filter(|f| f.handle.name == name)
            .cloned()
            .collect()
    }

    pub fn folder_creates(&self) -> usize {
        self.0.borrow().folder_creates
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn find_folders(&self, _token: &str, name: &str) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let mut state = self.0.borrow_mut();
        state.check()?;
        Ok(state
            .files
            .iter()
            .filter(|f| f.folder_id.is_none() && f.handle.name == name)
            .map(|f| f.handle.clone())
            .collect())
    }

    fn create_folder(&self, _token: &str, name: &str) -> Result<RemoteFileHandle, SyncError> {
        self.0.borrow_mut().check()?;
        let id = self.add_folder(name, Duration::zero());
        let mut state = self.0.borrow_mut();
        state.folder_creates += 1;
        Ok(state
            .files
            .iter()
            .find(|f| f.handle.id == id)
            .map(|f| f.handle.clone())
            .unwrap())
    }

    fn find_files(
        &self,
        _token: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let mut state = self.0.borrow_mut();
        state.check()?;
        Ok(state
            .files
            .iter()
            .filter(|f| f.folder_id.as_deref() == Some(folder_id) && f.handle.name == name)
            .map(|f| f.handle.clone())
            .collect())
    }

    fn create_file(
        &self,
        _token: &str,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError> {
        self.0.borrow_mut().check()?;
        Ok(self.add_file(folder_id, name, content))
    }

    fn update_file(
        &self,
        _token: &str,
        file_id: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError> {
        let mut state = self.0.borrow_mut();
        state.check()?;
        let (_, at) = state.tick();
        let file = state
            .files
            .iter_mut()
            .find(|f| f.handle.id == file_id)
            .ok_or_else(|| SyncError::NotFound {
                what: file_id.into(),
            })?;
        file.content = content.to_vec();
        file.handle.modified_at = at;
        file.handle.size_bytes = content.len() as u64;
        Ok(file.handle.clone())
    }

    fn list_files(
        &self,
        _token: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let mut state = self.0.borrow_mut();
        state.check()?;
        Ok(state
            .files
            .iter()
            .filter(|f| f.folder_id.as_deref() == Some(folder_id))
            .map(|f| f.handle.clone())
            .collect())
    }

    fn download(&self, _token: &str, file_id: &str) -> Result<Vec<u8>, SyncError> {
        let mut state = self.0.borrow_mut();
        state.check()?;
        state
            .files
            .iter()
            .find(|f| f.handle.id == file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| SyncError::NotFound {
                what: file_id.into(),
            })
    }
}

/// Responder returning a fixed reply and recording requests.
#[derive(Clone)]
pub struct FakeResponder {
    reply: Result<Vec<u8>, ResponderError>,
    requests: Rc<RefCell<Vec<ResponderRequest>>>,
}

impl FakeResponder {
    pub fn replying(body: &str) -> Self {
        Self {
            reply: Ok(body.as_bytes().to_vec()),
            requests: Rc::default(),
        }
    }

    pub fn failing(error: ResponderError) -> Self {
        Self {
            reply: Err(error),
            requests: Rc::default(),
        }
    }

    pub fn requests(&self) -> Vec<ResponderRequest> {
        self.requests.borrow().clone()
    }
}

impl Responder for FakeResponder {
    fn respond(&self, request: &ResponderRequest) -> Result<Vec<u8>, ResponderError> {
        self.requests.borrow_mut().push(request.clone());
        self.reply.clone()
    }
}
