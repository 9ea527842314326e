//! Session record
//!
//! The in-memory singleton carrying the verified claims of the current
//! session. Created exactly once after validation succeeds; the only
//! field that ever changes afterwards is `exp`, overwritten by a
//! successful extension.

use serde::Serialize;

use crate::error::SessionError;
use crate::token::codec::{now_unix_seconds, TokenClaims};

/// Verified session state, flattened from the token claims
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub application_id: String,
    pub user_id: String,
    pub org_id: String,
    /// Session activation, Unix seconds
    pub start_time: i64,
    /// Nominal grant in minutes
    pub duration_minutes: u64,
    pub iat: i64,
    /// Authoritative expiry, Unix seconds
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl SessionRecord {
    /// Builds the record from decoded claims, enforcing the required set
    pub fn from_claims(claims: &TokenClaims) -> Result<Self, SessionError> {
        fn required<T: Clone>(value: &Option<T>, claim: &str) -> Result<T, SessionError> {
            value.clone().ok_or_else(|| SessionError::MissingClaim {
                claim: claim.to_string(),
            })
        }

        let session_id = required(&claims.session_id, "sessionId")?;
        let user_id = required(&claims.user_id, "userId")?;
        let org_id = required(&claims.org_id, "orgId")?;
        let application_id = required(&claims.application_id, "applicationId")?;
        let exp = required(&claims.exp, "exp")?;
        let iat = required(&claims.iat, "iat")?;

        Ok(Self {
            session_id,
            application_id,
            user_id,
            org_id,
            start_time: claims.start_time.unwrap_or(iat),
            duration_minutes: claims.duration_minutes.unwrap_or(0),
            iat,
            exp,
            iss: claims.iss.clone(),
            sub: claims.sub.clone(),
        })
    }

    /// Seconds until `exp`, saturating at zero
    pub fn remaining_seconds(&self) -> u64 {
        self.exp.saturating_sub(now_unix_seconds()).max(0) as u64
    }

    /// Minutes since activation, rounded up
    pub fn actual_duration_minutes(&self) -> u64 {
        let elapsed = now_unix_seconds().saturating_sub(self.start_time).max(0) as u64;
        elapsed.div_ceil(60)
    }
}
