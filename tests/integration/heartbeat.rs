//! Heartbeat-loop tests
//!
//! Drift reconciliation against the server, the consecutive-failure
//! budget, late-response dropping, and cadence changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gw_session_sdk::api::SessionApi;
use gw_session_sdk::heartbeat::HeartbeatLoop;
use gw_session_sdk::platform::Platform;
use gw_session_sdk::SessionController;

use crate::common::fixtures::{base_config, mount_jwks, EventLog, TokenBuilder};
use crate::common::init_test_env;

fn heartbeat_path(session_id: &str) -> String {
    format!("/sessions/{}/heartbeat", session_id)
}

/// The server's reported remaining time overrides local optimism.
#[tokio::test]
async fn test_heartbeat_corrects_drift() {
    init_test_env();
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-drift")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "remaining_seconds": 30,
        })))
        .mount(&server)
        .await;

    let token = TokenBuilder::new("sess-drift").expires_in(60).build();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.enable_heartbeat = true;
    config.heartbeat_interval_seconds = 1;

    let controller = SessionController::new(config);
    controller.initialize().await.expect("initialize failed");
    assert!(controller.is_heartbeat_running());

    // the immediate first beat adopts the server's value
    sleep(Duration::from_millis(700)).await;
    let remaining = controller.remaining_seconds().unwrap();
    assert!(
        (28..=30).contains(&remaining),
        "expected server-corrected remaining, got {}",
        remaining
    );
}

/// After `max_failures` consecutive failures the loop stops and no
/// further POSTs are issued.
#[tokio::test]
async fn test_failure_budget_stops_the_loop() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-budget")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let api = Arc::new(SessionApi::new(&server.uri(), "test-token"));
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let error_sink = Arc::clone(&errors);

    let heartbeat = HeartbeatLoop::new(
        api,
        "sess-budget",
        Duration::from_millis(100),
        3,
        None,
        Some(Arc::new(move |err| {
            error_sink.lock().unwrap().push(err.code().to_string());
        })),
    );
    heartbeat.start();

    sleep(Duration::from_millis(600)).await;
    assert!(!heartbeat.is_running());
    assert_eq!(*errors.lock().unwrap(), vec!["heartbeat_failed"]);

    let posts_at_stop = server.received_requests().await.unwrap().len();
    assert_eq!(posts_at_stop, 3);

    // no further POSTs after the budget was exhausted
    sleep(Duration::from_millis(400)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), posts_at_stop);
}

/// A success resets the consecutive-failure count.
#[tokio::test]
async fn test_success_resets_failure_count() {
    init_test_env();
    let server = MockServer::start().await;
    // two failures, then steady success
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-reset")))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-reset")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let api = Arc::new(SessionApi::new(&server.uri(), "test-token"));
    let heartbeat = HeartbeatLoop::new(
        api,
        "sess-reset",
        Duration::from_millis(100),
        3,
        None,
        None,
    );
    heartbeat.start();

    sleep(Duration::from_millis(550)).await;
    assert!(heartbeat.is_running());
    assert_eq!(heartbeat.failure_count(), 0);
    heartbeat.stop();
}

/// A response that lands after `stop()` is dropped: it must not invoke
/// the sync callback or re-enable the loop.
#[tokio::test]
async fn test_late_response_after_stop_is_dropped() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-late")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "remaining_seconds": 30 }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let api = Arc::new(SessionApi::new(&server.uri(), "test-token"));
    let synced = Arc::new(AtomicUsize::new(0));
    let sync_sink = Arc::clone(&synced);

    let heartbeat = HeartbeatLoop::new(
        api,
        "sess-late",
        Duration::from_secs(5),
        3,
        Some(Arc::new(move |_| {
            sync_sink.fetch_add(1, Ordering::SeqCst);
        })),
        None,
    );
    heartbeat.start();

    // stop while the first beat's response is still in flight
    sleep(Duration::from_millis(100)).await;
    heartbeat.stop();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(synced.load(Ordering::SeqCst), 0);
    assert!(!heartbeat.is_running());
}

#[tokio::test]
async fn test_update_interval_restarts_in_place() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-cadence")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let api = Arc::new(SessionApi::new(&server.uri(), "test-token"));
    let heartbeat = HeartbeatLoop::new(
        api,
        "sess-cadence",
        Duration::from_secs(60),
        3,
        None,
        None,
    );
    heartbeat.start();
    sleep(Duration::from_millis(100)).await;
    // only the immediate beat so far
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    heartbeat.update_interval(Duration::from_millis(100));
    sleep(Duration::from_millis(450)).await;
    assert!(server.received_requests().await.unwrap().len() >= 3);
    heartbeat.stop();
}

/// Heartbeat gating without sync means the one
/// controller beats, and errors surface on the `on_error` event once
/// the budget is gone while the countdown keeps running locally.
#[tokio::test]
async fn test_budget_exhaustion_surfaces_error_and_session_continues() {
    init_test_env();
    let server = MockServer::start().await;
    mount_jwks(&server).await;
    Mock::given(method("POST"))
        .and(path(heartbeat_path("sess-degraded")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let token = TokenBuilder::new("sess-degraded").expires_in(3600).build();
    let log = EventLog::new();
    let mut config = base_config(&server.uri(), Platform::new_in_memory(), &token);
    config.enable_heartbeat = true;
    config.heartbeat_interval_seconds = 1;
    config.events = log.events();

    let controller = SessionController::new(config);
    controller.initialize().await.expect("initialize failed");

    sleep(Duration::from_millis(2600)).await;
    assert!(!controller.is_heartbeat_running());
    assert!(log
        .error_codes
        .lock()
        .unwrap()
        .contains(&"heartbeat_failed"));
    // the local countdown carries on
    assert!(controller.is_timer_running());
    assert!(!controller.is_ended());
}
