//! Error Types and Handling
//!
//! Defines error types used throughout the SDK. Every variant carries a
//! stable string code so hosts can branch on failures without matching
//! on display strings.

use thiserror::Error;

/// Main error type for the session SDK
///
/// Groups the token/claim failures raised during establishment, the
/// protocol failures raised by the marketplace REST surface, and the
/// control failures raised by the controller and its hook runner.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No token in the page URL query parameter or in persistent storage
    #[error("No session token found in URL or storage")]
    MissingToken,

    /// Token does not have exactly three `.`-separated segments
    #[error("Session token is not a three-segment compact token")]
    MalformedToken,

    /// A token segment is not base64url-decodable UTF-8 JSON
    #[error("Failed to decode token segment: {0}")]
    DecodeError(String),

    /// Signature does not validate under any key in the JWKS
    #[error("Session token signature is invalid")]
    InvalidSignature,

    /// A required claim is absent from the token
    #[error("Required claim `{claim}` is missing from the session token")]
    MissingClaim { claim: String },

    /// Any other claim-validation failure (issuer mismatch, bad key material)
    #[error("Claim validation failed: {reason}")]
    InvalidClaim { reason: String },

    /// Token `applicationId` differs from the configured application
    #[error("Session token is bound to a different application")]
    ApplicationMismatch,

    /// Token `exp` is in the past, or remaining time is already zero
    #[error("Session is expired")]
    SessionExpired,

    /// The backend validate round-trip itself failed (transport or non-2xx)
    #[error("Backend validation request failed: {reason}")]
    BackendValidationFailed { reason: String },

    /// The backend validate endpoint answered with `valid: false`
    #[error("Server rejected the session: {reason}")]
    SessionInvalid { reason: String },

    /// A heartbeat POST failed (transport or non-2xx)
    #[error("Session heartbeat failed: {reason}")]
    HeartbeatFailed { reason: String },

    /// The renew round-trip failed
    #[error("Session extension failed: {reason}")]
    ExtensionFailed { reason: String },

    /// The complete round-trip failed
    #[error("Session completion failed: {reason}")]
    CompletionFailed { reason: String },

    /// An operation was invoked before `initialize()` succeeded
    #[error("Session controller is not initialized")]
    NotInitialized,

    /// An operation needs a session record and none exists
    #[error("No active session")]
    NoSession,

    /// A lifecycle hook did not settle within the configured timeout
    #[error("Lifecycle hook `{hook}` timed out")]
    HookTimeout { hook: &'static str },

    /// A lifecycle hook returned an error
    #[error("Lifecycle hook `{hook}` failed")]
    HookError {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    /// Returns the stable error code for this error
    ///
    /// Codes are part of the SDK contract and never change between
    /// releases; hosts should branch on these rather than on messages.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MissingToken => "missing_token",
            SessionError::MalformedToken => "malformed_token",
            SessionError::DecodeError(_) => "decode_error",
            SessionError::InvalidSignature => "invalid_signature",
            SessionError::MissingClaim { .. } => "missing_claim",
            SessionError::InvalidClaim { .. } => "invalid_claim",
            SessionError::ApplicationMismatch => "application_mismatch",
            SessionError::SessionExpired => "session_expired",
            SessionError::BackendValidationFailed { .. } => "backend_validation_failed",
            SessionError::SessionInvalid { .. } => "session_invalid",
            SessionError::HeartbeatFailed { .. } => "heartbeat_failed",
            SessionError::ExtensionFailed { .. } => "extension_failed",
            SessionError::CompletionFailed { .. } => "completion_failed",
            SessionError::NotInitialized => "not_initialized",
            SessionError::NoSession => "no_session",
            SessionError::HookTimeout { .. } => "hook_timeout",
            SessionError::HookError { .. } => "hook_error",
        }
    }

    /// Returns true if this error came from a server round-trip rather
    /// than from local token or control state
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SessionError::BackendValidationFailed { .. }
                | SessionError::SessionInvalid { .. }
                | SessionError::HeartbeatFailed { .. }
                | SessionError::ExtensionFailed { .. }
                | SessionError::CompletionFailed { .. }
        )
    }
}
