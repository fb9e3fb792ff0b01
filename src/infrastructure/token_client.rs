//! OAuth token endpoint over HTTPS.

use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

use crate::domain::{AuthError, ClientDescriptor, Credential, TokenEndpoint, TokenGrant};

use super::http::{blocking_client, summarize_body};

/// Error body returned by OAuth token endpoints.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Form-encoded token endpoint client.
pub struct HttpTokenEndpoint {
    http: Client,
}

impl HttpTokenEndpoint {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(timeout_secs: u64) -> Result<Self, AuthError> {
        let http = blocking_client(timeout_secs)
            .map_err(|e| AuthError::exchange(format!("HTTP client unavailable: {e}")))?;
        Ok(Self { http })
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange_code(
        &self,
        client: &ClientDescriptor,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError> {
        let request = self.http.post(&client.token_uri).form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ]);

        request_grant(request).map_err(AuthError::exchange)
    }

    fn refresh(
        &self,
        credential: &Credential,
        refresh_token: &str,
    ) -> Result<TokenGrant, AuthError> {
        let request = self.http.post(&credential.token_endpoint).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
        ]);

        request_grant(request).map_err(AuthError::refresh)
    }
}

/// Sends a token request; the error string becomes the failure reason.
fn request_grant(request: RequestBuilder) -> Result<TokenGrant, String> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .map_err(|e| {
            if e.is_timeout() {
                "token endpoint timed out".to_string()
            } else {
                format!("token endpoint unreachable: {e}")
            }
        })?;

    let status = response.status();
    let body = response.text().map_err(|e| e.to_string())?;

    if !status.is_success() {
        let parsed: TokenErrorBody = serde_json::from_str(&body).unwrap_or_default();
        return Err(if parsed.error.is_empty() {
            format!("HTTP {}: {}", status.as_u16(), summarize_body(&body))
        } else {
            match parsed.error_description {
                Some(description) => format!("{}: {description}", parsed.error),
                None => parsed.error,
            }
        });
    }

    let grant: TokenGrant =
        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {e}"))?;
    if grant.access_token.is_empty() {
        return Err("token response has no access_token".into());
    }
    Ok(grant)
}
