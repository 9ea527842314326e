//! Common test utilities and fixtures for integration tests
//!
//! Provides shared test infrastructure including:
//! - RS256 test keypair and its JWKS, plus a token builder
//! - Recording modal/navigator/event collaborators
//! - Mock-server helpers for the marketplace endpoints

use std::sync::Once;

pub mod fixtures;

static INIT: Once = Once::new();

/// Initialize test environment once per test run
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
            .try_init()
            .ok();
    });
}
