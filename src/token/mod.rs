//! Session Token Handling
//!
//! This module handles the compact three-segment session token issued by
//! the marketplace: unverified decoding and claim inspection (`codec`)
//! and RS256 signature verification against the published JWKS
//! (`verifier`).

pub mod codec;
pub mod verifier;

// Re-export
pub use codec::{TokenClaims, TokenHeader};
pub use verifier::SignatureVerifier;
