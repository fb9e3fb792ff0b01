//! Google Drive v3 adapter for the remote object store.
//!
//! Uploads are two requests: metadata first (`POST /drive/v3/files`), then
//! the content (`PATCH /upload/drive/v3/files/{id}?uploadType=media`). With
//! the `drive.file` scope only files created by this client are visible.

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use crate::domain::{ObjectStore, RemoteFileHandle, SyncConfig, SyncError};

use super::http::{blocking_client, summarize_body};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,modifiedTime,size";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,modifiedTime,size)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
}

impl From<DriveFile> for RemoteFileHandle {
    fn from(file: DriveFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            modified_at: file.modified_time.unwrap_or_default(),
            size_bytes: file.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Blocking Drive v3 client.
pub struct DriveClient {
    http: Client,
    api_base: String,
}

impl DriveClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(api_base: &str, timeout_secs: u64) -> Result<Self, SyncError> {
        let http = blocking_client(timeout_secs).map_err(transport_error)?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(&config.api_base, config.timeout_secs)
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn upload_url(&self, file_id: &str) -> String {
        format!("{}/upload/drive/v3/files/{file_id}", self.api_base)
    }

    /// Runs a `files.list` query, following every page.
    fn query(&self, token: &str, q: &str) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let mut handles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.files_url())
                .bearer_auth(token)
                .query(&[
                    ("q", q),
                    ("fields", LIST_FIELDS),
                    ("spaces", "drive"),
                    ("pageSize", "100"),
                ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: FileList = send_json(request, "file listing")?;
            handles.extend(page.files.into_iter().map(RemoteFileHandle::from));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(handles)
    }

    fn upload_content(
        &self,
        token: &str,
        file_id: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError> {
        let request = self
            .http
            .patch(self.upload_url(file_id))
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(content.to_vec());

        let file: DriveFile = send_json(request, file_id)?;
        Ok(file.into())
    }
}

impl ObjectStore for DriveClient {
    fn find_folders(&self, token: &str, name: &str) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let q = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query(name)
        );
        self.query(token, &q)
    }

    fn create_folder(&self, token: &str, name: &str) -> Result<RemoteFileHandle, SyncError> {
        let request = self
            .http
            .post(self.files_url())
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }));

        let folder: DriveFile = send_json(request, name)?;
        tracing::info!(folder = %name, id = %folder.id, "Created remote folder");
        Ok(folder.into())
    }

    fn find_files(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let q = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(folder_id)
        );
        self.query(token, &q)
    }

    fn create_file(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError> {
        let request = self
            .http
            .post(self.files_url())
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&json!({
                "name": name,
                "parents": [folder_id],
                "mimeType": "application/json",
            }));

        let created: DriveFile = send_json(request, name)?;
        self.upload_content(token, &created.id, content)
    }

    fn update_file(
        &self,
        token: &str,
        file_id: &str,
        content: &[u8],
    ) -> Result<RemoteFileHandle, SyncError> {
        self.upload_content(token, file_id, content)
    }

    fn list_files(
        &self,
        token: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteFileHandle>, SyncError> {
        let q = format!(
            "'{}' in parents and mimeType != '{FOLDER_MIME}' and trashed = false",
            escape_query(folder_id)
        );
        self.query(token, &q)
    }

    fn download(&self, token: &str, file_id: &str) -> Result<Vec<u8>, SyncError> {
        let request = self
            .http
            .get(format!("{}/{file_id}", self.files_url()))
            .bearer_auth(token)
            .query(&[("alt", "media")]);

        let response = send(request, file_id)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(transport_error)
    }
}

/// Escapes a literal for use inside a single-quoted Drive query string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn send(request: RequestBuilder, what: &str) -> Result<Response, SyncError> {
    let response = request.send().map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body = %summarize_body(&body), "Drive request failed");
    Err(status_error(status.as_u16(), what, &body))
}

fn send_json<T: serde::de::DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> Result<T, SyncError> {
    send(request, what)?
        .json()
        .map_err(|e| SyncError::ConnectionFailed {
            reason: format!("unexpected response body: {e}"),
        })
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::ConnectionFailed {
            reason: err.to_string(),
        }
    }
}

fn status_error(code: u16, what: &str, body: &str) -> SyncError {
    match code {
        403 | 429 => SyncError::QuotaOrPermission {
            reason: summarize_body(body),
        },
        404 => SyncError::NotFound { what: what.into() },
        _ => SyncError::HttpStatus { code },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::test_support::blocking;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file_json(id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "modifiedTime": "2025-10-09T12:00:00.000Z",
            "size": "42",
        })
    }

    #[test]
    fn test_escape_query_quotes() {
        assert_eq!(escape_query("Bob's backups"), "Bob\\'s backups");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(403, "x", "rate limited"),
            SyncError::QuotaOrPermission { .. }
        ));
        assert!(matches!(
            status_error(429, "x", ""),
            SyncError::QuotaOrPermission { .. }
        ));
        assert_eq!(
            status_error(404, "abc", ""),
            SyncError::NotFound { what: "abc".into() }
        );
        assert_eq!(status_error(502, "x", ""), SyncError::HttpStatus { code: 502 });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_folders_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "p2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "files": [file_json("f2", "Backups")] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [file_json("f1", "Backups")],
                "nextPageToken": "p2",
            })))
            .mount(&server)
            .await;

        let base = server.uri();
        let folders = blocking(move || {
            DriveClient::new(&base, 5)
                .unwrap()
                .find_folders("tok", "Backups")
        })
        .await
        .unwrap();

        let ids: Vec<_> = folders.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2"]);
        assert_eq!(folders[0].size_bytes, 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_file_uploads_metadata_then_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new1", "name": "b.json" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/new1"))
            .and(query_param("uploadType", "media"))
            .and(body_bytes(b"{\"a\":1}".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json("new1", "b.json")))
            .expect(1)
            .mount(&server)
            .await;

        let base = server.uri();
        let handle = blocking(move || {
            DriveClient::new(&base, 5)
                .unwrap()
                .create_file("tok", "folder1", "b.json", b"{\"a\":1}")
        })
        .await
        .unwrap();

        assert_eq!(handle.id, "new1");
        assert_eq!(handle.name, "b.json");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_maps_missing_file() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = blocking(move || DriveClient::new(&base, 5).unwrap().download("tok", "gone")).await;

        assert_eq!(result, Err(SyncError::NotFound { what: "gone".into() }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quota_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(403).set_body_string("storageQuotaExceeded"))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = blocking(move || DriveClient::new(&base, 5).unwrap().list_files("tok", "f")).await;

        assert_eq!(
            result,
            Err(SyncError::QuotaOrPermission {
                reason: "storageQuotaExceeded".into()
            })
        );
    }
}
