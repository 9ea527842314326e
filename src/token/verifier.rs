//! RS256 signature verification against the marketplace JWKS
//!
//! Resolves the configured JWKS URI (site-relative paths resolve against
//! the host page origin), fetches and caches the key set, and verifies
//! session tokens under the RS256 allow-list with issuer and
//! application-id binding.

use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tokio::sync::OnceCell;

use crate::error::SessionError;
use crate::token::codec::TokenClaims;

/// Timeout for the JWKS fetch
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies session tokens against a remote public-key set
///
/// The key set is fetched once and cached for the lifetime of the
/// verifier; a controller constructs one verifier per session.
pub struct SignatureVerifier {
    http: reqwest::Client,
    jwks_uri: String,
    keys: OnceCell<JwkSet>,
}

impl SignatureVerifier {
    /// Creates a verifier for the given JWKS URI
    ///
    /// A site-relative `jwks_uri` (leading `/`) is resolved against the
    /// origin of `page_url` when one is available; absolute URIs are
    /// used as-is.
    pub fn new(jwks_uri: &str, page_url: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .user_agent(concat!("gw-session-sdk/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            jwks_uri: resolve_jwks_uri(jwks_uri, page_url),
            keys: OnceCell::new(),
        }
    }

    /// Verifies a token and returns its claims
    ///
    /// Enforcement order matches establishment semantics:
    /// 1. header must carry `alg: RS256`
    /// 2. signature must validate under some key in the set — the
    ///    `kid`-named key is tried first, then every remaining RSA key
    ///    (key rotation keeps multiple live keys published)
    /// 3. `exp` must be in the future (no leeway)
    /// 4. `iss` must equal `expected_issuer`
    /// 5. required claims must all be present
    /// 6. `applicationId` must match `expected_application_id` when given
    pub async fn verify(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_application_id: Option<&str>,
    ) -> Result<TokenClaims, SessionError> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|_| SessionError::MalformedToken)?;

        // Algorithm allow-list: RS256 only
        if header.alg != Algorithm::RS256 {
            tracing::warn!(alg = ?header.alg, "Rejecting token with disallowed algorithm");
            return Err(SessionError::InvalidSignature);
        }

        let jwks = self.keys.get_or_try_init(|| self.fetch_jwks()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[expected_issuer]);

        // Reject with InvalidSignature only after every candidate key
        // has been tried. A non-signature failure means a key accepted
        // the signature and the claims themselves are bad; surface it.
        for jwk in candidate_keys(jwks, header.kid.as_deref()) {
            let decoding_key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(
                        kid = ?jwk.common.key_id,
                        error = %e,
                        "Skipping unusable JWKS key"
                    );
                    continue;
                }
            };

            let claims = match jsonwebtoken::decode::<TokenClaims>(token, &decoding_key, &validation)
            {
                Ok(data) => data.claims,
                Err(err)
                    if matches!(
                        err.kind(),
                        jsonwebtoken::errors::ErrorKind::InvalidSignature
                    ) =>
                {
                    continue;
                }
                Err(err) => return Err(map_jwt_error(err)),
            };

            claims.validate_required()?;

            if let Some(expected) = expected_application_id.filter(|id| !id.is_empty()) {
                if claims.application_id.as_deref() != Some(expected) {
                    tracing::warn!(
                        expected_application_id = expected,
                        token_application_id = ?claims.application_id,
                        "Token is bound to a different application"
                    );
                    return Err(SessionError::ApplicationMismatch);
                }
            }

            tracing::debug!(
                session_id = ?claims.session_id,
                kid = ?jwk.common.key_id,
                "Session token verified"
            );
            return Ok(claims);
        }

        tracing::warn!("Token signature did not validate under any key in the set");
        Err(SessionError::InvalidSignature)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, SessionError> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::InvalidClaim {
                reason: format!("JWKS fetch failed: {}", e),
            })?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| SessionError::InvalidClaim {
                reason: format!("JWKS response is not a valid key set: {}", e),
            })
    }
}

/// Resolves a site-relative JWKS path against the host page origin
fn resolve_jwks_uri(jwks_uri: &str, page_url: Option<&str>) -> String {
    if !jwks_uri.starts_with('/') {
        return jwks_uri.to_string();
    }
    match page_url.and_then(|u| reqwest::Url::parse(u).ok()) {
        Some(base) => match base.join(jwks_uri) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => jwks_uri.to_string(),
        },
        None => jwks_uri.to_string(),
    }
}

/// Orders the signing-key candidates: the `kid`-named key first when
/// the header carries one that the set knows, then every other RSA key
fn candidate_keys<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Vec<&'a Jwk> {
    let mut candidates: Vec<&Jwk> = Vec::new();
    if let Some(kid) = kid {
        if let Some(jwk) = jwks.find(kid) {
            candidates.push(jwk);
        }
    }
    let matched_kid: Option<String> = candidates
        .first()
        .and_then(|jwk| jwk.common.key_id.clone());
    for jwk in &jwks.keys {
        if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
            continue;
        }
        if matched_kid.is_some() && jwk.common.key_id == matched_kid {
            continue;
        }
        candidates.push(jwk);
    }
    candidates
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> SessionError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => SessionError::SessionExpired,
        ErrorKind::InvalidSignature => SessionError::InvalidSignature,
        ErrorKind::InvalidIssuer => SessionError::InvalidClaim {
            reason: "issuer mismatch".to_string(),
        },
        ErrorKind::MissingRequiredClaim(claim) => SessionError::MissingClaim {
            claim: claim.clone(),
        },
        ErrorKind::InvalidToken => SessionError::MalformedToken,
        ErrorKind::Base64(e) => SessionError::DecodeError(format!("invalid base64url: {}", e)),
        ErrorKind::Json(e) => SessionError::DecodeError(format!("segment is not valid JSON: {}", e)),
        ErrorKind::Utf8(e) => SessionError::DecodeError(format!("segment is not UTF-8: {}", e)),
        other => SessionError::InvalidClaim {
            reason: format!("{:?}", other),
        },
    }
}
