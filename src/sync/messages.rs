//! Cross-context sync messages
//!
//! A closed tagged union over `{pause, resume, end, timer_update}` with
//! a common envelope `{sessionId, tabId, timestamp}`. Unknown tags
//! decode to [`SyncMessage::Unknown`] and are dropped silently by the
//! bus, which keeps old SDK versions forward compatible with newer
//! publishers.

use serde::{Deserialize, Serialize};

/// Payload of a sync message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Peers should pause their timer
    Pause,
    /// Peers should resume their timer
    Resume,
    /// Peers should run their termination path
    End,
    /// Peers should overwrite their timer's remaining time
    TimerUpdate {
        #[serde(rename = "remainingSeconds")]
        remaining_seconds: u64,
    },
    /// A tag this SDK version does not know; dropped on receipt
    #[serde(other)]
    Unknown,
}

/// Envelope common to every sync message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    pub session_id: String,
    /// Publisher's context id, used to filter own messages on receipt
    pub tab_id: String,
    /// Publish time, Unix milliseconds
    pub timestamp: i64,
    #[serde(flatten)]
    pub message: SyncMessage,
}

impl SyncEnvelope {
    pub fn new(session_id: &str, tab_id: &str, message: SyncMessage) -> Self {
        Self {
            session_id: session_id.to_string(),
            tab_id: tab_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            message,
        }
    }

    /// Serializes the envelope for the wire
    pub fn encode(&self) -> String {
        // a struct of strings, integers and a closed enum cannot fail
        serde_json::to_string(self).expect("sync envelope serialization failed")
    }

    /// Decodes a wire payload; `None` for anything unintelligible
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
