//! Verification-gate tests
//!
//! Every bad token must be refused with its typed error before any
//! session state exists, and no `onSessionStart` event may fire.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gw_session_sdk::platform::{Platform, SharedStore};
use gw_session_sdk::session::controller::TOKEN_STORAGE_KEY;
use gw_session_sdk::SessionController;

use crate::common::fixtures::{
    base_config, mount_jwks, mount_rotation_jwks, EventLog, TokenBuilder,
};
use crate::common::init_test_env;

async fn jwks_server() -> MockServer {
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    server
}

#[tokio::test]
async fn test_valid_token_initializes_and_persists() {
    init_test_env();
    let server = jwks_server().await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-ok").build();
    let log = EventLog::new();

    let mut config = base_config(&server.uri(), platform.clone(), &token);
    config.auto_start = false;
    config.events = log.events();

    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");

    assert_eq!(record.session_id, "sess-ok");
    assert_eq!(record.application_id, "app-test");
    assert_eq!(log.started_count(), 1);
    assert_eq!(
        platform.store.get(TOKEN_STORAGE_KEY).as_deref(),
        Some(token.as_str())
    );
    // timer exists but was not started
    assert!(!controller.is_timer_running());
    assert!(controller.remaining_seconds().unwrap() > 3500);
}

#[tokio::test]
async fn test_token_found_in_storage_when_url_has_none() {
    init_test_env();
    let server = jwks_server().await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-stored").build();
    platform.store.set(TOKEN_STORAGE_KEY, &token);

    let mut config = base_config(&server.uri(), platform.clone(), &token);
    config.page_url = Some("https://app.example.com/run".to_string());
    config.auto_start = false;

    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");
    assert_eq!(record.session_id, "sess-stored");
}

#[tokio::test]
async fn test_missing_token_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let platform = Platform::new_in_memory();
    let log = EventLog::new();

    let mut config = base_config(&server.uri(), platform, "unused");
    config.page_url = None;
    config.events = log.events();

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "missing_token");
    assert_eq!(log.started_count(), 0);
    assert_eq!(*log.error_codes.lock().unwrap(), vec!["missing_token"]);
}

#[tokio::test]
async fn test_bad_signature_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-forged").signed_with_wrong_key().build();
    let log = EventLog::new();

    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.events = log.events();

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "invalid_signature");
    assert_eq!(log.started_count(), 0);
    assert!(!controller.is_timer_running());
}

/// During key rotation the JWKS publishes several live keys; a token
/// signed under any of them must verify.
#[tokio::test]
async fn test_token_signed_by_rotated_key_verifies() {
    init_test_env();
    let server = MockServer::start().await;
    mount_rotation_jwks(&server).await;

    // the kid names the second key directly
    let token = TokenBuilder::new("sess-rot-kid").signed_with_secondary_key().build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.auto_start = false;
    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");
    assert_eq!(record.session_id, "sess-rot-kid");
}

/// Without a `kid`, every key in the set is a candidate; only the
/// non-first key matches this signature.
#[tokio::test]
async fn test_rotated_key_without_kid_verifies() {
    init_test_env();
    let server = MockServer::start().await;
    mount_rotation_jwks(&server).await;

    let token = TokenBuilder::new("sess-rot-nokid")
        .signed_with_secondary_key()
        .without_kid()
        .build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.auto_start = false;
    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");
    assert_eq!(record.session_id, "sess-rot-nokid");
}

/// A `kid` the set does not know falls back to trying every key.
#[tokio::test]
async fn test_rotated_key_with_unknown_kid_verifies() {
    init_test_env();
    let server = MockServer::start().await;
    mount_rotation_jwks(&server).await;

    let token = TokenBuilder::new("sess-rot-stale")
        .signed_with_secondary_key()
        .kid("gw-retired-key-9")
        .build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.auto_start = false;
    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");
    assert_eq!(record.session_id, "sess-rot-stale");
}

/// An unpublished signing key fails even against the multi-key set,
/// and only after every key was tried.
#[tokio::test]
async fn test_unpublished_key_fails_against_rotation_set() {
    init_test_env();
    let server = MockServer::start().await;
    mount_rotation_jwks(&server).await;

    let token = TokenBuilder::new("sess-rot-forged")
        .signed_with_wrong_key()
        .without_kid()
        .build();
    let config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "invalid_signature");
}

#[tokio::test]
async fn test_disallowed_algorithm_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-hs256").build_hs256();

    let config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "invalid_signature");
}

#[tokio::test]
async fn test_issuer_mismatch_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-iss")
        .issuer("https://rogue.example.com")
        .build();

    let config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "invalid_claim");
}

#[tokio::test]
async fn test_missing_required_claim_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-claims").without_org_id().build();

    let config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "missing_claim");
}

#[tokio::test]
async fn test_application_mismatch_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-app").application_id("app-test").build();
    let log = EventLog::new();

    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.application_id = Some("app-other".to_string());
    config.events = log.events();

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "application_mismatch");
    assert_eq!(log.started_count(), 0);
}

#[tokio::test]
async fn test_expired_token_is_refused() {
    init_test_env();
    let server = jwks_server().await;
    let token = TokenBuilder::new("sess-old").expires_in(-120).build();

    let config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "session_expired");
}

#[tokio::test]
async fn test_backend_validation_accepts_valid_session() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    // signed with a key the (unmounted) JWKS would reject: backend
    // validation must not consult the JWKS at all
    let token = TokenBuilder::new("sess-backend").signed_with_wrong_key().build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.use_backend_validation = true;
    config.auto_start = false;

    let controller = SessionController::new(config);
    let record = controller.initialize().await.expect("initialize failed");
    assert_eq!(record.session_id, "sess-backend");
}

#[tokio::test]
async fn test_backend_validation_rejection_surfaces_server_error() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": false,
            "error": "session revoked",
        })))
        .mount(&server)
        .await;

    let token = TokenBuilder::new("sess-revoked").build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.use_backend_validation = true;

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "session_invalid");
    assert!(err.to_string().contains("session revoked"));
}

#[tokio::test]
async fn test_backend_validation_still_enforces_application_binding() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/validate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "valid": true })),
        )
        .mount(&server)
        .await;

    let token = TokenBuilder::new("sess-bound").application_id("app-test").build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.use_backend_validation = true;
    config.application_id = Some("app-other".to_string());

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "application_mismatch");
}

#[tokio::test]
async fn test_backend_validation_transport_failure() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/validate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let token = TokenBuilder::new("sess-503").build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.use_backend_validation = true;

    let controller = SessionController::new(config);
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.code(), "backend_validation_failed");
}
