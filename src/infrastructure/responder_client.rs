//! AI responder reached over an HTTP webhook.

use reqwest::blocking::Client;

use crate::domain::{Responder, ResponderConfig, ResponderError, ResponderRequest};

use super::http::{blocking_client, summarize_body};

/// POSTs each request as JSON to a configured webhook URL.
pub struct WebhookResponder {
    http: Client,
    url: String,
}

impl WebhookResponder {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, ResponderError> {
        let http = blocking_client(timeout_secs).map_err(|e| ResponderError::ConnectionFailed {
            reason: e.to_string(),
        })?;
        Ok(Self {
            http,
            url: url.trim().to_string(),
        })
    }

    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &ResponderConfig) -> Result<Self, ResponderError> {
        Self::new(&config.webhook_url, config.timeout_secs)
    }
}

impl Responder for WebhookResponder {
    fn respond(&self, request: &ResponderRequest) -> Result<Vec<u8>, ResponderError> {
        if self.url.is_empty() {
            return Err(ResponderError::NotConfigured);
        }

        tracing::debug!(
            session = %request.session_id,
            context = request.context.len(),
            "Calling responder webhook"
        );

        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ResponderError::Timeout
                } else {
                    ResponderError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %summarize_body(&body), "Responder returned an error");
            return Err(ResponderError::HttpStatus {
                code: status.as_u16(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ResponderError::ConnectionFailed {
                reason: e.to_string(),
            })
    }
}
