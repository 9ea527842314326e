//! Profile-scoped shared storage
//!
//! The analog of single-origin persistent storage: a string key-value
//! store shared by every context of one profile, with change events so
//! listeners can react to writes from other contexts (the storage-event
//! fallback transport of the sync bus is built on this).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// Buffered change events per store before slow receivers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A single storage mutation
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub key: String,
    /// New value, or `None` when the key was removed
    pub value: Option<String>,
}

/// Profile-scoped persistent key-value storage with change events
///
/// Implementations must be safe to share across every SDK instance of
/// one profile. Writes are last-writer-wins; the SDK's keys are all
/// session-id-scoped or carry identical payloads, so no locking beyond
/// the store's own is required.
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    /// Subscribes to change events for every key in the store
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory store, the default backing for a [`super::Platform`]
///
/// "Persistent" within the process lifetime, which matches what
/// intra-origin navigations need from it; hosts with real persistence
/// requirements supply their own `SharedStore`.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, key: &str, value: Option<String>) {
        // send fails only when nobody is subscribed
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("store lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value.to_string());
        self.emit(key, Some(value.to_string()));
    }

    fn remove(&self, key: &str) {
        let removed = self
            .entries
            .lock()
            .expect("store lock poisoned")
            .remove(key)
            .is_some();
        if removed {
            self.emit(key, None);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
