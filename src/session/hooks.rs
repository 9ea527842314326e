//! Host lifecycle hooks
//!
//! The host supplies optional async callbacks for session lifecycle
//! moments. Every invocation races a per-hook timeout. `onSessionStart`
//! is strict: a failure or timeout aborts initialization. All other
//! hooks are lenient: failures are logged and swallowed so a buggy host
//! can never wedge the termination path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::SessionError;
use crate::session::record::SessionRecord;

/// Result returned by a host hook
pub type HookResult = Result<(), anyhow::Error>;

/// A host-supplied async lifecycle callback
pub type Hook<T> = Arc<dyn Fn(T) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Expired,
    Manual,
    Error,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Expired => write!(f, "expired"),
            EndReason::Manual => write!(f, "manual"),
            EndReason::Error => write!(f, "error"),
        }
    }
}

/// Context handed to `onSessionEnd`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndContext {
    pub session_id: String,
    pub user_id: String,
    pub reason: EndReason,
    /// Minutes since activation, rounded up
    pub actual_duration_minutes: u64,
}

/// Context handed to `onSessionExtend`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExtendContext {
    pub additional_minutes: u64,
    /// New authoritative expiry, Unix seconds
    pub new_expires_at: i64,
}

/// Context handed to `onSessionWarning`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWarningContext {
    pub remaining_seconds: u64,
}

/// The host's lifecycle callbacks; every one is optional
#[derive(Clone, Default)]
pub struct SessionHooks {
    /// Strict: a failure aborts `initialize()`
    pub on_session_start: Option<Hook<SessionRecord>>,
    /// Lenient
    pub on_session_end: Option<Hook<SessionEndContext>>,
    /// Lenient
    pub on_session_extend: Option<Hook<SessionExtendContext>>,
    /// Lenient
    pub on_session_warning: Option<Hook<SessionWarningContext>>,
}

/// Runs a hook in strict mode: the failure aborts the caller
///
/// An omitted hook is a silent no-op.
pub(crate) async fn run_strict<T>(
    name: &'static str,
    hook: Option<&Hook<T>>,
    context: T,
    timeout: Duration,
) -> Result<(), SessionError> {
    let Some(hook) = hook else {
        return Ok(());
    };
    match tokio::time::timeout(timeout, hook(context)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(SessionError::HookError { hook: name, source }),
        Err(_) => Err(SessionError::HookTimeout { hook: name }),
    }
}

/// Runs a hook in lenient mode: failures are logged and swallowed
pub(crate) async fn run_lenient<T>(
    name: &'static str,
    hook: Option<&Hook<T>>,
    context: T,
    timeout: Duration,
) {
    if let Err(err) = run_strict(name, hook, context, timeout).await {
        tracing::warn!(hook = name, error = %err, "Lenient hook failed, continuing");
    }
}
