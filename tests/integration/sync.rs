//! Cross-context sync tests
//!
//! Master election between controllers, heartbeat gating, pause/resume
//! fan-out, and cross-context termination.

use std::time::Duration;

use serial_test::serial;
use tokio::time::sleep;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gw_session_sdk::config::SessionConfig;
use gw_session_sdk::platform::{Platform, SharedStore};
use gw_session_sdk::session::controller::TOKEN_STORAGE_KEY;
use gw_session_sdk::sync::SyncOptions;
use gw_session_sdk::SessionController;

use crate::common::fixtures::{base_config, mount_jwks, EventLog, RecordingModal, TokenBuilder};
use crate::common::init_test_env;

fn fast_sync_options() -> SyncOptions {
    SyncOptions {
        master_heartbeat: Duration::from_millis(100),
        master_stale: Duration::from_millis(300),
    }
}

fn sync_config(server_uri: &str, platform: Platform, token: &str) -> SessionConfig {
    let mut config = base_config(server_uri, platform, token);
    config.enable_tab_sync = true;
    config.sync_options = fast_sync_options();
    config
}

async fn server_with_endpoints(session_id: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{}/heartbeat", session_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{}/complete", session_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    server
}

/// The first context is master and beats; the second is
/// not and does not; when the master unloads, the survivor takes over
/// the lease and the heartbeat.
#[tokio::test]
async fn test_master_election_and_heartbeat_takeover() {
    init_test_env();
    let server = server_with_endpoints("sess-elect").await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-elect").build();

    let mut config_a = sync_config(&server.uri(), platform.clone(), &token);
    config_a.enable_heartbeat = true;
    config_a.heartbeat_interval_seconds = 1;
    let a = SessionController::new(config_a);
    a.initialize().await.expect("initialize A failed");
    assert!(a.is_master_tab());
    assert!(a.is_heartbeat_running());

    let mut config_b = sync_config(&server.uri(), platform.clone(), &token);
    config_b.enable_heartbeat = true;
    config_b.heartbeat_interval_seconds = 1;
    let b = SessionController::new(config_b);
    b.initialize().await.expect("initialize B failed");

    // exactly the master runs the heartbeat
    assert!(!b.is_master_tab());
    assert!(!b.is_heartbeat_running());

    sleep(Duration::from_millis(300)).await;
    assert!(a.is_master_tab());
    assert!(!b.is_master_tab());

    // the master unloads gracefully; the lease is released
    a.destroy();

    sleep(Duration::from_millis(400)).await;
    assert!(b.is_master_tab());
    assert!(b.is_heartbeat_running());

    b.destroy();
}

/// A pause issued on one context pauses every peer's timer.
#[tokio::test]
async fn test_pause_and_resume_fan_out() {
    init_test_env();
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-fanout").build();

    let a = SessionController::new(sync_config(&server.uri(), platform.clone(), &token));
    a.initialize().await.expect("initialize A failed");
    let b = SessionController::new(sync_config(&server.uri(), platform.clone(), &token));
    b.initialize().await.expect("initialize B failed");
    assert!(a.is_timer_running());
    assert!(b.is_timer_running());

    a.pause_timer().expect("pause failed");
    sleep(Duration::from_millis(100)).await;
    assert!(!a.is_timer_running());
    assert!(!b.is_timer_running());

    b.resume_timer().expect("resume failed");
    sleep(Duration::from_millis(100)).await;
    assert!(a.is_timer_running());
    assert!(b.is_timer_running());

    a.destroy();
    b.destroy();
}

/// Completion on one context terminates every peer.
#[tokio::test]
async fn test_cross_context_termination() {
    init_test_env();
    let server = server_with_endpoints("sess-complete").await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-complete").build();

    let log_a = EventLog::new();
    let mut config_a = sync_config(&server.uri(), platform.clone(), &token);
    config_a.events = log_a.events();
    let a = SessionController::new(config_a);
    a.initialize().await.expect("initialize A failed");

    let log_b = EventLog::new();
    let modal_b = RecordingModal::new();
    let mut config_b = sync_config(&server.uri(), platform.clone(), &token);
    config_b.events = log_b.events();
    config_b.modal = Some(modal_b.clone());
    let b = SessionController::new(config_b);
    b.initialize().await.expect("initialize B failed");

    a.complete_session(Some(42)).await.expect("complete failed");
    assert!(a.is_ended());
    assert_eq!(log_a.ended_count(), 1);

    sleep(Duration::from_millis(200)).await;
    assert!(b.is_ended());
    assert_eq!(log_b.ended_count(), 1);
    assert!(!b.is_timer_running());
    assert!(modal_b.endings() >= 1);
    assert!(platform.store.get(TOKEN_STORAGE_KEY).is_none());
}

/// The storage fallback transport carries the same traffic.
#[tokio::test]
async fn test_storage_transport_fan_out() {
    init_test_env();
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    let platform = Platform::new_in_memory();
    let token = TokenBuilder::new("sess-storage").build();

    let mut config_a = sync_config(&server.uri(), platform.clone(), &token);
    config_a.sync_transport = gw_session_sdk::sync::SyncTransport::Storage;
    let a = SessionController::new(config_a);
    a.initialize().await.expect("initialize A failed");

    let mut config_b = sync_config(&server.uri(), platform.clone(), &token);
    config_b.sync_transport = gw_session_sdk::sync::SyncTransport::Storage;
    let b = SessionController::new(config_b);
    b.initialize().await.expect("initialize B failed");

    a.pause_timer().expect("pause failed");
    sleep(Duration::from_millis(100)).await;
    assert!(!b.is_timer_running());

    a.destroy();
    b.destroy();
}

/// Controllers constructed without an explicit platform share the
/// process-global profile, so a token persisted by one is found by the
/// next.
#[tokio::test]
#[serial]
async fn test_default_platform_is_shared() {
    init_test_env();
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    let token = TokenBuilder::new("sess-global").build();

    let mut config_a = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config_a.platform = None; // fall back to the global profile
    config_a.auto_start = false;
    let a = SessionController::new(config_a);
    a.initialize().await.expect("initialize A failed");

    // no token in the page URL; it must come from shared storage
    let mut config_b = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config_b.platform = None;
    config_b.page_url = None;
    config_b.auto_start = false;
    let b = SessionController::new(config_b);
    let record = b.initialize().await.expect("initialize B failed");
    assert_eq!(record.session_id, "sess-global");

    Platform::global().store.remove(TOKEN_STORAGE_KEY);
    a.destroy();
    b.destroy();
}
