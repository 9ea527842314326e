//! Wire types for the marketplace session API
//!
//! Field names follow the marketplace protocol (snake_case). Responses
//! keep unknown fields in an `extra` map so protocol additions never
//! break deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /sessions/validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidateRequest {
    pub session_jwt: String,
}

/// Response of `POST /sessions/validate`
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Body of `POST /sessions/{id}/heartbeat`
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest {
    /// Wall-clock timestamp of the beat, Unix milliseconds
    pub timestamp: i64,
    /// Liveness marker, always true
    pub active: bool,
}

/// Response of `POST /sessions/{id}/heartbeat`
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatResponse {
    /// Authoritative remaining seconds as reported by the server
    #[serde(default)]
    pub remaining_seconds: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Body of `PUT /sessions/{id}/renew`
#[derive(Debug, Clone, Serialize)]
pub struct RenewRequest {
    pub additional_minutes: u64,
}

/// Response of `PUT /sessions/{id}/renew`
#[derive(Debug, Clone, Deserialize)]
pub struct RenewResponse {
    /// New authoritative expiry, Unix seconds
    pub new_expires_at: i64,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Body of `POST /sessions/{id}/complete`
#[derive(Debug, Clone, Serialize)]
pub struct CompleteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_usage_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
