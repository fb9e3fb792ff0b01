//! OAuth client descriptors and credentials.
//!
//! A `ClientDescriptor` is parsed from a downloaded client secrets file; a
//! `Credential` is what the token endpoint hands back after consent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::AuthError;

/// File-scoped access: only files this application created.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// An installed (desktop) OAuth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDescriptor {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct InstalledSection {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientDescriptor {
    /// Parses a client secrets JSON document.
    ///
    /// Accepts `{"installed": {...}}`. Service-account keys and web clients are
    /// rejected as `InvalidCredentialType`; anything else is `MalformedCredentials`.
    ///
    /// # Errors
    /// Returns `AuthError` when the descriptor is unusable.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AuthError::malformed(format!("not valid JSON: {e}")))?;

        let Some(object) = value.as_object() else {
            return Err(AuthError::malformed("expected a JSON object"));
        };

        if object.get("type").and_then(Value::as_str) == Some("service_account")
            || (object.contains_key("private_key") && object.contains_key("client_email"))
        {
            return Err(AuthError::InvalidCredentialType {
                found: "service_account".into(),
            });
        }

        let Some(installed) = object.get("installed") else {
            if object.contains_key("web") {
                return Err(AuthError::InvalidCredentialType {
                    found: "web".into(),
                });
            }
            return Err(AuthError::malformed("missing 'installed' client section"));
        };

        let section: InstalledSection = serde_json::from_value(installed.clone())
            .map_err(|e| AuthError::malformed(format!("invalid 'installed' section: {e}")))?;

        if section.client_id.trim().is_empty() {
            return Err(AuthError::malformed("client_id is empty"));
        }
        if section.client_secret.trim().is_empty() {
            return Err(AuthError::malformed("client_secret is empty"));
        }

        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
            auth_uri: section
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: section
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            redirect_uri: section
                .redirect_uris
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        })
    }
}

/// OAuth credential for the remote object store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    /// True once `now >= expiry - skew`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expiry
            .checked_sub_signed(skew)
            .is_none_or(|deadline| now >= deadline)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Token endpoint response for a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_descriptor() {
        let raw = r#"{"installed":{"client_id":"abc.apps","client_secret":"s3cret",
            "token_uri":"https://example.test/token","redirect_uris":["http://localhost"]}}"#;
        let descriptor = ClientDescriptor::parse(raw).unwrap();

        assert_eq!(descriptor.client_id, "abc.apps");
        assert_eq!(descriptor.token_uri, "https://example.test/token");
        assert_eq!(descriptor.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(descriptor.redirect_uri, "http://localhost");
    }

    #[test]
    fn test_parse_rejects_service_account() {
        let raw = r#"{"type":"service_account","client_email":"bot@x.iam","private_key":"k"}"#;
        assert_eq!(
            ClientDescriptor::parse(raw),
            Err(AuthError::InvalidCredentialType {
                found: "service_account".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_web_client() {
        let raw = r#"{"web":{"client_id":"a","client_secret":"b"}}"#;
        assert!(matches!(
            ClientDescriptor::parse(raw),
            Err(AuthError::InvalidCredentialType { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for raw in ["not json", "[]", "{}", r#"{"installed":{"client_id":""}}"#] {
            assert!(
                matches!(
                    ClientDescriptor::parse(raw),
                    Err(AuthError::MalformedCredentials { .. })
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credential = Credential {
            access_token: "ya29.token".into(),
            refresh_token: Some("1//refresh".into()),
            token_endpoint: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: vec![DRIVE_FILE_SCOPE.into()],
            expiry: Utc::now(),
        };
        let debug = format!("{credential:?}");
        assert!(!debug.contains("ya29.token"));
        assert!(!debug.contains("1//refresh"));
        assert!(!debug.contains("\"secret\""));
    }

    #[test]
    fn test_needs_refresh_honours_skew() {
        let now = Utc::now();
        let credential = Credential {
            access_token: "a".into(),
            refresh_token: None,
            token_endpoint: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            expiry: now + Duration::seconds(30),
        };
        assert!(!credential.needs_refresh(now, Duration::zero()));
        assert!(credential.needs_refresh(now, Duration::seconds(60)));
    }
}
