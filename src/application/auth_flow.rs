//! OAuth authorization-code flow with PKCE.
//!
//! `begin` validates the client descriptor and returns the consent URL;
//! the user approves in a browser and pastes back either the code or the
//! whole redirect URL, which `complete` exchanges for a credential.
//! `ensure_fresh` refreshes that credential shortly before it expires.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::domain::{
    AccessTokenProvider, AuthError, ClientDescriptor, Credential, TokenEndpoint, TokenGrant,
    DRIVE_FILE_SCOPE,
};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Upper bound for the early-refresh margin.
const MAX_REFRESH_SKEW_SECS: i64 = 86_400;

/// Where the flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingConsent,
    Authorized,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "signed out"),
            Self::AwaitingConsent => write!(f, "awaiting consent"),
            Self::Authorized => write!(f, "signed in"),
        }
    }
}

/// PKCE parameters (S256) plus the CSRF `state` value.
#[derive(Debug, Clone)]
struct Pkce {
    verifier: String,
    challenge: String,
    state: String,
}

impl Pkce {
    fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        let mut state_bytes = [0u8; 16];
        rng.fill_bytes(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self {
            verifier,
            challenge,
            state,
        }
    }
}

/// An authorization request waiting for the user's consent.
struct PendingAuthorization {
    client: ClientDescriptor,
    pkce: Pkce,
}

/// Owns the OAuth credential and every transition of it.
pub struct AuthFlow {
    endpoint: Box<dyn TokenEndpoint>,
    pending: Option<PendingAuthorization>,
    credential: Option<Credential>,
    skew: Duration,
    refreshed: bool,
}

impl AuthFlow {
    /// `refresh_skew_secs` early refresh margin before expiry, clamped to
    /// `0..=86400`.
    #[must_use]
    pub fn new(endpoint: Box<dyn TokenEndpoint>, refresh_skew_secs: i64) -> Self {
        let skew = Duration::try_seconds(refresh_skew_secs.clamp(0, MAX_REFRESH_SKEW_SECS))
            .unwrap_or_else(Duration::zero);
        Self {
            endpoint,
            pending: None,
            credential: None,
            skew,
            refreshed: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> AuthState {
        if self.pending.is_some() {
            AuthState::AwaitingConsent
        } else if self.credential.is_some() {
            AuthState::Authorized
        } else {
            AuthState::Unauthenticated
        }
    }

    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Starts a sign-in from a client secrets document.
    ///
    /// Returns the URL the user must open to grant access. On error the
    /// state is left untouched.
    ///
    /// # Errors
    /// `MalformedCredentials` or `InvalidCredentialType` for unusable descriptors.
    pub fn begin(&mut self, client_secrets: &str) -> Result<String, AuthError> {
        let client = ClientDescriptor::parse(client_secrets)?;
        let pkce = Pkce::generate();

        let url = Url::parse_with_params(
            &client.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", client.redirect_uri.as_str()),
                ("scope", DRIVE_FILE_SCOPE),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", pkce.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AuthError::malformed(format!("invalid auth_uri: {e}")))?;

        self.credential = None;
        self.pending = Some(PendingAuthorization { client, pkce });
        tracing::info!("Authorization started, awaiting consent");

        Ok(url.into())
    }

    /// Finishes sign-in with the code the user copied from the consent page.
    ///
    /// `input` may be the bare code or the full redirect URL; a URL's `state`
    /// must match the one issued by `begin`. A failed exchange keeps the
    /// pending request so the user can try again.
    ///
    /// # Errors
    /// `ExchangeFailed` if no sign-in is pending, the input is unusable, or
    /// the token endpoint rejects the code.
    pub fn complete(&mut self, input: &str) -> Result<Credential, AuthError> {
        self.complete_at(input, Utc::now())
    }

    /// [`complete`](Self::complete) as of `now`.
    ///
    /// # Errors
    /// See [`complete`](Self::complete).
    pub fn complete_at(&mut self, input: &str, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| AuthError::exchange("no authorization in progress"))?;

        let (code, state) = parse_authorization_input(input)?;
        if let Some(state) = state {
            if state != pending.pkce.state {
                tracing::warn!("Authorization response state does not match request");
                return Err(AuthError::exchange("state mismatch"));
            }
        }

        let grant = self
            .endpoint
            .exchange_code(&pending.client, &code, &pending.pkce.verifier)
            .map_err(|e| match e {
                AuthError::ExchangeFailed { .. } => e,
                other => AuthError::exchange(other.to_string()),
            })?;

        let expiry = expiry_from(&grant, now)
            .ok_or_else(|| AuthError::exchange("token lifetime out of range"))?;

        let client = &pending.client;
        let credential = Credential {
            scopes: granted_scopes(&grant),
            expiry,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_endpoint: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
        };

        if credential.refresh_token.is_none() {
            tracing::warn!("Token endpoint issued no refresh token; sign-in will not survive expiry");
        }

        self.pending = None;
        self.credential = Some(credential.clone());
        tracing::info!("Authorization completed");

        Ok(credential)
    }

    /// Returns a credential valid for at least the refresh skew, refreshing
    /// it first when needed.
    ///
    /// # Errors
    /// `NotAuthenticated` without a credential; `RefreshFailed` if the refresh
    /// token is absent or rejected, which also signs the user out.
    pub fn ensure_fresh(&mut self) -> Result<Credential, AuthError> {
        self.ensure_fresh_at(Utc::now())
    }

    /// [`ensure_fresh`](Self::ensure_fresh) as of `now`.
    ///
    /// # Errors
    /// See [`ensure_fresh`](Self::ensure_fresh).
    pub fn ensure_fresh_at(&mut self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let Some(current) = self.credential.as_ref() else {
            return Err(AuthError::NotAuthenticated);
        };

        if !current.needs_refresh(now, self.skew) {
            return Ok(current.clone());
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            self.credential = None;
            tracing::warn!("Access token expired and no refresh token is held");
            return Err(AuthError::refresh("no refresh token"));
        };

        tracing::debug!("Refreshing access token");
        let grant = match self.endpoint.refresh(current, &refresh_token) {
            Ok(grant) => grant,
            Err(e) => {
                self.credential = None;
                tracing::warn!(error = %e, "Token refresh failed, signed out");
                return Err(match e {
                    AuthError::RefreshFailed { .. } => e,
                    other => AuthError::refresh(other.to_string()),
                });
            }
        };

        let Some(expiry) = expiry_from(&grant, now) else {
            self.credential = None;
            tracing::warn!("Refreshed token lifetime out of range, signed out");
            return Err(AuthError::refresh("token lifetime out of range"));
        };

        let mut refreshed = current.clone();
        refreshed.expiry = expiry;
        if grant.scope.is_some() {
            refreshed.scopes = granted_scopes(&grant);
        }
        refreshed.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token {
            refreshed.refresh_token = Some(rotated);
        }

        self.credential = Some(refreshed.clone());
        self.refreshed = true;
        Ok(refreshed)
    }

    /// Adopts a previously exported credential.
    pub fn restore(&mut self, credential: Credential) {
        self.pending = None;
        self.credential = Some(credential);
    }

    /// Reports (once) whether a refresh replaced the credential since the last call.
    pub fn take_refreshed(&mut self) -> bool {
        std::mem::take(&mut self.refreshed)
    }

    /// Discards all credential state.
    pub fn reset(&mut self) {
        self.pending = None;
        self.credential = None;
        self.refreshed = false;
    }
}

impl AccessTokenProvider for AuthFlow {
    fn access_token(&mut self) -> Result<String, AuthError> {
        self.ensure_fresh().map(|c| c.access_token)
    }
}

/// Splits user input into `(code, state)`.
///
/// Accepts a bare code, a full redirect URL, or a bare `code=...&state=...` query.
fn parse_authorization_input(input: &str) -> Result<(String, Option<String>), AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::exchange("authorization code is empty"));
    }

    let url = if input.contains("://") {
        Url::parse(input).ok()
    } else if input.contains("code=") {
        Url::parse(&format!("http://localhost/?{}", input.trim_start_matches('?'))).ok()
    } else {
        None
    };

    let Some(url) = url else {
        return Ok((input.to_string(), None));
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::exchange(format!("consent denied: {value}"))),
            _ => {}
        }
    }

    let code = code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::exchange("redirect URL has no code parameter"))?;
    Ok((code, state))
}

/// `None` when `expires_in` cannot be represented as a timestamp.
fn expiry_from(grant: &TokenGrant, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lifetime = Duration::try_seconds(grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))?;
    now.checked_add_signed(lifetime)
}

fn granted_scopes(grant: &TokenGrant) -> Vec<String> {
    grant.scope.as_deref().map_or_else(
        || vec![DRIVE_FILE_SCOPE.to_string()],
        |s| s.split_whitespace().map(String::from).collect(),
    )
}
