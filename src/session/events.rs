//! Host events
//!
//! Fire-and-forget notifications emitted to the host, distinct from the
//! lifecycle hooks: events carry no failure semantics and never block
//! the controller.

use std::sync::Arc;

use crate::error::SessionError;
use crate::session::record::SessionRecord;

/// Host event callbacks; every one is optional
#[derive(Clone, Default)]
pub struct SessionEvents {
    pub on_session_start: Option<Arc<dyn Fn(&SessionRecord) + Send + Sync>>,
    pub on_session_warning: Option<Arc<dyn Fn(u64) + Send + Sync>>,
    pub on_session_end: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&SessionError) + Send + Sync>>,
}

impl SessionEvents {
    pub(crate) fn emit_start(&self, record: &SessionRecord) {
        if let Some(cb) = &self.on_session_start {
            cb(record);
        }
    }

    pub(crate) fn emit_warning(&self, remaining_seconds: u64) {
        if let Some(cb) = &self.on_session_warning {
            cb(remaining_seconds);
        }
    }

    pub(crate) fn emit_end(&self) {
        if let Some(cb) = &self.on_session_end {
            cb();
        }
    }

    pub(crate) fn emit_error(&self, error: &SessionError) {
        tracing::debug!(code = error.code(), error = %error, "Emitting error event");
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }
}
