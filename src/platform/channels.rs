//! Named cross-context broadcast channels
//!
//! The analog of a named cross-context broadcast channel: any context of
//! the same profile can obtain the sender for a channel name and every
//! subscriber receives every published message, including the
//! publisher's own (receivers filter by sender id).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

/// Buffered messages per channel before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Registry of named broadcast channels within one profile
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the sender for a named channel, creating it on first use
    pub fn sender(&self, name: &str) -> broadcast::Sender<String> {
        let mut channels = self.inner.lock().expect("registry lock poisoned");
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribes to a named channel
    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<String> {
        self.sender(name).subscribe()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
