//! Session API HTTP client
//!
//! Thin wrapper around `reqwest::Client` for the marketplace session
//! endpoints. Every request carries `Authorization: Bearer <token>` and
//! a JSON body; a non-2xx status maps to the typed error of the calling
//! operation.

use std::time::Duration;

use reqwest::Client;

use crate::api::types::{
    CompleteRequest, HeartbeatRequest, HeartbeatResponse, RenewRequest, RenewResponse,
    ValidateRequest, ValidateResponse,
};
use crate::error::SessionError;

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Marketplace session REST client
///
/// Bound to one base URL and one session token for its lifetime.
#[derive(Clone, Debug)]
pub struct SessionApi {
    client: Client,
    base_url: String,
    token: String,
}

impl SessionApi {
    /// Creates a client for the given API endpoint, authenticated with
    /// the session token
    pub fn new(base_url: &str, token: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("gw-session-sdk/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Returns the configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /sessions/validate` — delegate token validation to the server
    pub async fn validate(&self, session_jwt: &str) -> Result<ValidateResponse, SessionError> {
        let url = format!("{}/sessions/validate", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&ValidateRequest {
                session_jwt: session_jwt.to_string(),
            })
            .send()
            .await
            .map_err(|e| SessionError::BackendValidationFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::BackendValidationFailed {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SessionError::BackendValidationFailed {
                reason: format!("invalid response body: {}", e),
            })
    }

    /// `POST /sessions/{id}/heartbeat` — liveness signal for this session
    pub async fn heartbeat(&self, session_id: &str) -> Result<HeartbeatResponse, SessionError> {
        let url = format!("{}/sessions/{}/heartbeat", self.base_url, session_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&HeartbeatRequest {
                timestamp: chrono::Utc::now().timestamp_millis(),
                active: true,
            })
            .send()
            .await
            .map_err(|e| SessionError::HeartbeatFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HeartbeatFailed {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SessionError::HeartbeatFailed {
                reason: format!("invalid response body: {}", e),
            })
    }

    /// `PUT /sessions/{id}/renew` — negotiate a session extension
    pub async fn renew(
        &self,
        session_id: &str,
        additional_minutes: u64,
    ) -> Result<RenewResponse, SessionError> {
        let url = format!("{}/sessions/{}/renew", self.base_url, session_id);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&RenewRequest { additional_minutes })
            .send()
            .await
            .map_err(|e| SessionError::ExtensionFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::ExtensionFailed {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SessionError::ExtensionFailed {
                reason: format!("invalid response body: {}", e),
            })
    }

    /// `POST /sessions/{id}/complete` — report normal completion
    ///
    /// The response body is implementation-defined on the server side;
    /// only the status matters here.
    pub async fn complete(
        &self,
        session_id: &str,
        actual_usage_minutes: Option<u64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), SessionError> {
        let url = format!("{}/sessions/{}/complete", self.base_url, session_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&CompleteRequest {
                actual_usage_minutes,
                metadata,
            })
            .send()
            .await
            .map_err(|e| SessionError::CompletionFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::CompletionFailed {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(())
    }
}
