//! Heartbeat Loop
//!
//! Periodically POSTs a liveness signal for the session and adopts the
//! server's authoritative remaining time. Failures are tolerated up to a
//! consecutive-failure budget; once exhausted the loop stops itself and
//! reports the last error upstream, leaving the session on its local
//! countdown.
//!
//! With tab sync enabled only the master context runs a heartbeat loop;
//! with sync disabled the sole context runs it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::api::SessionApi;
use crate::error::SessionError;

/// Default consecutive-failure budget
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Receives the server-reported remaining seconds after a successful beat
pub type SyncCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Receives the last error once the failure budget is exhausted
pub type ErrorCallback = Arc<dyn Fn(SessionError) + Send + Sync>;

/// Periodic session heartbeat against the marketplace API
pub struct HeartbeatLoop {
    api: Arc<SessionApi>,
    session_id: String,
    interval: Mutex<Duration>,
    max_failures: u32,
    on_sync: Option<SyncCallback>,
    on_error: Option<ErrorCallback>,
    running: Arc<AtomicBool>,
    /// Bumped on every start/stop; a beat whose response lands after a
    /// stop sees a newer generation and is dropped
    generation: Arc<AtomicU64>,
    failures: Arc<AtomicU32>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatLoop {
    pub fn new(
        api: Arc<SessionApi>,
        session_id: &str,
        interval: Duration,
        max_failures: u32,
        on_sync: Option<SyncCallback>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            api,
            session_id: session_id.to_string(),
            interval: Mutex::new(interval),
            max_failures,
            on_sync,
            on_error,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU32::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Fires an immediate heartbeat, then beats at the configured
    /// interval. A second `start` while running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Heartbeat start ignored: already running");
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.failures.store(0, Ordering::SeqCst);

        let api = Arc::clone(&self.api);
        let session_id = self.session_id.clone();
        let interval = *self.interval.lock().expect("heartbeat lock poisoned");
        let max_failures = self.max_failures;
        let on_sync = self.on_sync.clone();
        let on_error = self.on_error.clone();
        let running = Arc::clone(&self.running);
        let generations = Arc::clone(&self.generation);
        let failures = Arc::clone(&self.failures);

        tracing::info!(
            session_id = %session_id,
            interval_secs = interval.as_secs_f64(),
            "Heartbeat loop starting"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let live = || {
                generations.load(Ordering::SeqCst) == generation && running.load(Ordering::SeqCst)
            };
            loop {
                // first tick completes immediately: immediate initial beat
                ticker.tick().await;
                if !live() {
                    break;
                }

                match api.heartbeat(&session_id).await {
                    Ok(response) => {
                        // a stop raced the round-trip: drop the response
                        if !live() {
                            tracing::debug!("Dropping heartbeat response after stop");
                            break;
                        }
                        failures.store(0, Ordering::SeqCst);
                        if let Some(remaining) = response.remaining_seconds {
                            if remaining.is_finite() && remaining >= 0.0 {
                                tracing::debug!(
                                    remaining_seconds = remaining,
                                    "Adopting server-reported remaining time"
                                );
                                if let Some(cb) = &on_sync {
                                    cb(remaining as u64);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        if !live() {
                            break;
                        }
                        let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        tracing::warn!(
                            failure_count = count,
                            max_failures = max_failures,
                            error = %err,
                            "Heartbeat failed"
                        );
                        if count >= max_failures {
                            running.store(false, Ordering::SeqCst);
                            tracing::error!(
                                "Heartbeat failure budget exhausted, stopping loop"
                            );
                            if let Some(cb) = &on_error {
                                cb(err);
                            }
                            break;
                        }
                    }
                }
            }
        });

        *self.task.lock().expect("heartbeat lock poisoned") = Some(handle);
    }

    /// Cancels the loop; in-flight responses are dropped and cannot
    /// re-enable it
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().expect("heartbeat lock poisoned").take() {
            handle.abort();
        }
        tracing::debug!("Heartbeat loop stopped");
    }

    /// Changes the cadence, restarting transparently when running
    pub fn update_interval(&self, interval: Duration) {
        *self.interval.lock().expect("heartbeat lock poisoned") = interval;
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consecutive failures since the last successful beat
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl Drop for HeartbeatLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().expect("heartbeat lock poisoned").take() {
            handle.abort();
        }
    }
}
