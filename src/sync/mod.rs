//! Tab Sync Bus
//!
//! Delivers sync messages to every other context of the same profile
//! bound to the same session id, and elects exactly one context as the
//! master responsible for server heartbeats.
//!
//! Transport is a named broadcast channel scoped by session id; where a
//! host cannot provide one, the bus falls back to change events on a
//! well-known storage key. Mastership is a timestamped lease in profile
//! storage, refreshed while the master lives and seized by any peer that
//! observes the lease going stale.

pub mod messages;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::platform::{Platform, SharedStore};

pub use messages::{SyncEnvelope, SyncMessage};

/// Receives every foreign message for this session
pub type MessageHandler = Arc<dyn Fn(SyncMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Notified when this context's mastership changes (currently only
/// promotions happen; a master keeps the lease until it unloads)
pub type MasterChangeHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// How messages travel between contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTransport {
    /// Named broadcast channel (preferred)
    Broadcast,
    /// Storage change events on the session's sync key (fallback)
    Storage,
}

/// Election timing
///
/// The defaults give the documented liveness bound: a master crash is
/// detected within twice the beacon interval.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Cadence of the master's lease refresh and of peers' staleness
    /// checks
    pub master_heartbeat: Duration,
    /// Lease age beyond which a peer seizes mastership
    pub master_stale: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            master_heartbeat: Duration::from_secs(5),
            master_stale: Duration::from_secs(10),
        }
    }
}

/// Channel name for a session's sync messages
pub fn channel_name(session_id: &str) -> String {
    format!("gw-session-{}", session_id)
}

/// Storage key carrying the master lease (Unix-ms beacon)
pub fn master_key(session_id: &str) -> String {
    format!("gw_session_master_{}", session_id)
}

/// Storage key carrying the most recent fallback-transport payload
pub fn sync_key(session_id: &str) -> String {
    format!("gw_session_sync_{}", session_id)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cross-context sync bus for one session
pub struct TabSyncBus {
    session_id: String,
    tab_id: String,
    transport: SyncTransport,
    platform: Platform,
    is_master: Arc<AtomicBool>,
    channel: broadcast::Sender<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TabSyncBus {
    /// Joins the session's bus, claiming mastership when no live lease
    /// exists, and starts the receive and election tasks
    pub fn new(
        session_id: &str,
        platform: Platform,
        transport: SyncTransport,
        options: SyncOptions,
        on_message: MessageHandler,
        on_master_change: MasterChangeHandler,
    ) -> Self {
        let tab_id = uuid::Uuid::new_v4().to_string();
        let channel = platform.channels.sender(&channel_name(session_id));
        let is_master = Arc::new(AtomicBool::new(false));

        // Initial claim: no lease means no master is alive
        let lease_key = master_key(session_id);
        if platform.store.get(&lease_key).is_none() {
            platform.store.set(&lease_key, &now_millis().to_string());
            is_master.store(true, Ordering::SeqCst);
            tracing::info!(session_id = %session_id, tab_id = %tab_id, "Assumed session mastership");
        }

        let bus = Self {
            session_id: session_id.to_string(),
            tab_id,
            transport,
            platform,
            is_master,
            channel,
            tasks: Mutex::new(Vec::new()),
        };
        bus.spawn_receive_task(on_message);
        bus.spawn_election_task(options, on_master_change);
        bus
    }

    /// Publishes a message to every other context of this session
    pub fn broadcast(&self, message: SyncMessage) {
        let raw = SyncEnvelope::new(&self.session_id, &self.tab_id, message).encode();
        match self.transport {
            SyncTransport::Broadcast => {
                // send fails only when no context is subscribed
                let _ = self.channel.send(raw);
            }
            SyncTransport::Storage => {
                self.platform.store.set(&sync_key(&self.session_id), &raw);
            }
        }
    }

    /// True while this context holds the master lease
    pub fn is_master_tab(&self) -> bool {
        self.is_master.load(Ordering::SeqCst)
    }

    /// This context's id on the bus
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Detaches from the bus: stops the tasks, clears the sync key and,
    /// when this context is master, releases the lease
    pub fn destroy(&self) {
        for task in self.tasks.lock().expect("sync lock poisoned").drain(..) {
            task.abort();
        }
        self.platform.store.remove(&sync_key(&self.session_id));
        if self.is_master.swap(false, Ordering::SeqCst) {
            self.platform.store.remove(&master_key(&self.session_id));
            tracing::info!(session_id = %self.session_id, "Released session mastership");
        }
    }

    fn spawn_receive_task(&self, on_message: MessageHandler) {
        let session_id = self.session_id.clone();
        let tab_id = self.tab_id.clone();

        let handle = match self.transport {
            SyncTransport::Broadcast => {
                let mut rx = self.channel.subscribe();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(raw) => {
                                Self::dispatch(&session_id, &tab_id, &raw, &on_message).await
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Sync receiver lagged, messages dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            }
            SyncTransport::Storage => {
                let mut rx = self.platform.store.subscribe();
                let key = sync_key(&self.session_id);
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(event) => {
                                if event.key != key {
                                    continue;
                                }
                                if let Some(raw) = event.value {
                                    Self::dispatch(&session_id, &tab_id, &raw, &on_message).await;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Sync receiver lagged, messages dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            }
        };

        self.tasks.lock().expect("sync lock poisoned").push(handle);
    }

    async fn dispatch(session_id: &str, tab_id: &str, raw: &str, on_message: &MessageHandler) {
        let Some(envelope) = SyncEnvelope::decode(raw) else {
            tracing::debug!("Dropping undecodable sync payload");
            return;
        };
        if envelope.session_id != session_id || envelope.tab_id == tab_id {
            return;
        }
        if envelope.message == SyncMessage::Unknown {
            tracing::debug!("Dropping sync message with unknown type");
            return;
        }
        tracing::debug!(message = ?envelope.message, from = %envelope.tab_id, "Sync message received");
        on_message(envelope.message).await;
    }

    fn spawn_election_task(&self, options: SyncOptions, on_master_change: MasterChangeHandler) {
        let store = Arc::clone(&self.platform.store);
        let is_master = Arc::clone(&self.is_master);
        let lease_key = master_key(&self.session_id);
        let session_id = self.session_id.clone();
        let stale_millis = options.master_stale.as_millis() as i64;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(options.master_heartbeat);
            // skip the immediate first tick; the initial claim ran in new()
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let now = now_millis();

                if is_master.load(Ordering::SeqCst) {
                    // liveness beacon
                    store.set(&lease_key, &now.to_string());
                } else {
                    let lease = store
                        .get(&lease_key)
                        .and_then(|v| v.parse::<i64>().ok());
                    let dead = match lease {
                        None => true,
                        Some(beacon) => now.saturating_sub(beacon) > stale_millis,
                    };
                    if dead {
                        store.set(&lease_key, &now.to_string());
                        is_master.store(true, Ordering::SeqCst);
                        tracing::info!(session_id = %session_id, "Seized session mastership");
                        on_master_change(true);
                    }
                }
            }
        });

        self.tasks.lock().expect("sync lock poisoned").push(handle);
    }
}

impl Drop for TabSyncBus {
    fn drop(&mut self) {
        for task in self.tasks.lock().expect("sync lock poisoned").drain(..) {
            task.abort();
        }
    }
}
