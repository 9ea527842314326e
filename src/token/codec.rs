//! Unverified token codec
//!
//! Decodes compact three-segment session tokens without checking the
//! signature. Used for claim inspection after backend validation and for
//! client-local expiry math. Signature verification lives in
//! [`super::verifier`].
//!
//! Everything here is pure: no global state, all errors recoverable at
//! the call site.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Claims carried by a session token
///
/// Every field is optional at this layer; required-claim enforcement
/// happens in the verifier and when the session record is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Opaque identifier of the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Opaque identifier of the consuming application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Unix seconds at which the session was activated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Nominal grant in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Authoritative expiry, Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl TokenClaims {
    /// Checks that every claim the SDK requires is present
    ///
    /// Required set: `sessionId`, `userId`, `orgId`, `applicationId`,
    /// `exp`, `iat`.
    pub fn validate_required(&self) -> Result<(), SessionError> {
        let missing = |claim: &str| SessionError::MissingClaim {
            claim: claim.to_string(),
        };

        if self.session_id.is_none() {
            return Err(missing("sessionId"));
        }
        if self.user_id.is_none() {
            return Err(missing("userId"));
        }
        if self.org_id.is_none() {
            return Err(missing("orgId"));
        }
        if self.application_id.is_none() {
            return Err(missing("applicationId"));
        }
        if self.exp.is_none() {
            return Err(missing("exp"));
        }
        if self.iat.is_none() {
            return Err(missing("iat"));
        }
        Ok(())
    }
}

/// Unverified token header (segment 1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm identifier, e.g. `RS256`
    pub alg: String,
    /// Key id selecting the JWKS entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Current wall-clock time in Unix seconds
pub(crate) fn now_unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

fn split_segments(token: &str) -> Result<(&str, &str, &str), SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [header, claims, signature] => Ok((header, claims, signature)),
        _ => Err(SessionError::MalformedToken),
    }
}

fn decode_segment_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, SessionError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| SessionError::DecodeError(format!("invalid base64url: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| SessionError::DecodeError(format!("segment is not UTF-8: {}", e)))?;
    serde_json::from_str(&text)
        .map_err(|e| SessionError::DecodeError(format!("segment is not valid JSON: {}", e)))
}

/// Decodes the claims segment of a token without verifying the signature
pub fn decode_claims(token: &str) -> Result<TokenClaims, SessionError> {
    let (_, claims, _) = split_segments(token)?;
    decode_segment_json(claims)
}

/// Decodes the header segment of a token without verifying the signature
pub fn decode_header(token: &str) -> Result<TokenHeader, SessionError> {
    let (header, _, _) = split_segments(token)?;
    decode_segment_json(header)
}

/// Extracts a single claim by name from an unverified token
///
/// Returns `Ok(None)` when the token decodes but the claim is absent.
pub fn extract_claim(token: &str, name: &str) -> Result<Option<serde_json::Value>, SessionError> {
    let (_, claims, _) = split_segments(token)?;
    let value: serde_json::Value = decode_segment_json(claims)?;
    Ok(value.get(name).cloned())
}

/// Client-local expiry check
///
/// True iff the claims carry `exp` and the wall clock has reached it.
/// A token without `exp`, or one that does not decode, is not expired
/// from the codec's point of view.
pub fn is_expired(token: &str) -> bool {
    match decode_claims(token) {
        Ok(claims) => match claims.exp {
            Some(exp) => now_unix_seconds() >= exp,
            None => false,
        },
        Err(_) => false,
    }
}

/// Seconds until client-local expiry, saturating at zero
///
/// Returns 0 when `exp` is absent or the token does not decode.
pub fn time_remaining(token: &str) -> u64 {
    match decode_claims(token) {
        Ok(TokenClaims { exp: Some(exp), .. }) => exp.saturating_sub(now_unix_seconds()).max(0) as u64,
        _ => 0,
    }
}
