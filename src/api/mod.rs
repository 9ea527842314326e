//! Marketplace Session API
//!
//! Typed REST client for the issuer's session endpoints: validate,
//! heartbeat, renew, and complete.

pub mod client;
pub mod types;

// Re-export
pub use client::SessionApi;
pub use types::{HeartbeatResponse, RenewResponse, ValidateResponse};
