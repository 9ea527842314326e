//! Session Controller
//!
//! Top-level orchestrator. `initialize()` locates and verifies the
//! session token, materializes the session record, and wires the
//! countdown timer, the heartbeat loop, and the sync bus. At runtime it
//! routes timer edges to hooks/modal/events, adopts authoritative
//! remaining-time updates, and drives the idempotent termination path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::SessionApi;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::heartbeat::HeartbeatLoop;
use crate::platform::{LoggingNavigator, Navigator, Platform, SharedStore};
use crate::session::hooks::{
    self, EndReason, SessionEndContext, SessionExtendContext, SessionWarningContext,
};
use crate::session::modal::{ModalCallback, ModalRequest, NullModal, SessionModal};
use crate::session::record::SessionRecord;
use crate::sync::{MasterChangeHandler, MessageHandler, SyncMessage, TabSyncBus};
use crate::timer::{CountdownTimer, TimerCallbacks};
use crate::token::codec;
use crate::token::verifier::SignatureVerifier;

/// Storage key persisting the raw token across intra-origin navigations
pub const TOKEN_STORAGE_KEY: &str = "gw_marketplace_jwt";

/// Minutes requested when the user extends from the warning modal
const MODAL_EXTEND_MINUTES: u64 = 15;

/// Top-level session orchestrator; one per embedded context
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: SessionConfig,
    platform: Platform,
    modal: Arc<dyn SessionModal>,
    navigator: Arc<dyn Navigator>,
    token: Mutex<Option<String>>,
    record: Mutex<Option<SessionRecord>>,
    api: Mutex<Option<Arc<SessionApi>>>,
    timer: Mutex<Option<Arc<CountdownTimer>>>,
    heartbeat: Mutex<Option<Arc<HeartbeatLoop>>>,
    sync: Mutex<Option<Arc<TabSyncBus>>>,
    initialized: AtomicBool,
    ended: AtomicBool,
}

impl SessionController {
    /// Creates a controller; nothing runs until `initialize()`
    pub fn new(config: SessionConfig) -> Self {
        let platform = config.platform.clone().unwrap_or_else(Platform::global);
        let modal: Arc<dyn SessionModal> =
            config.modal.clone().unwrap_or_else(|| Arc::new(NullModal));
        let navigator: Arc<dyn Navigator> = config
            .navigator
            .clone()
            .unwrap_or_else(|| Arc::new(LoggingNavigator));

        Self {
            inner: Arc::new(ControllerInner {
                config,
                platform,
                modal,
                navigator,
                token: Mutex::new(None),
                record: Mutex::new(None),
                api: Mutex::new(None),
                timer: Mutex::new(None),
                heartbeat: Mutex::new(None),
                sync: Mutex::new(None),
                initialized: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Establishes the session: locates and verifies the token, builds
    /// the session record, runs the strict start hook, and wires timer,
    /// heartbeat, and sync bus
    ///
    /// Any failure short-circuits, surfaces as the typed error, and is
    /// also emitted on the `on_error` event. The token is persisted to
    /// storage before the start hook runs, so a hook rejection leaves
    /// the token behind for a retried initialization.
    pub async fn initialize(&self) -> Result<SessionRecord, SessionError> {
        match self.inner.initialize().await {
            Ok(record) => Ok(record),
            Err(err) => {
                self.inner.config.events.emit_error(&err);
                Err(err)
            }
        }
    }

    /// Pauses the countdown and tells peer contexts to pause theirs
    pub fn pause_timer(&self) -> Result<(), SessionError> {
        self.inner.require_initialized()?;
        self.inner.with_timer(|timer| timer.pause());
        self.inner.broadcast(SyncMessage::Pause);
        Ok(())
    }

    /// Resumes the countdown and tells peer contexts to resume theirs
    pub fn resume_timer(&self) -> Result<(), SessionError> {
        self.inner.require_initialized()?;
        self.inner.with_timer(|timer| timer.resume());
        self.inner.broadcast(SyncMessage::Resume);
        Ok(())
    }

    /// Negotiates an extension with the marketplace and propagates the
    /// new expiry locally and to peers; returns the new expiry
    pub async fn extend_session(&self, additional_minutes: u64) -> Result<i64, SessionError> {
        self.inner.extend_session(additional_minutes).await
    }

    /// Reports normal completion to the marketplace, then terminates
    pub async fn complete_session(
        &self,
        actual_usage_minutes: Option<u64>,
    ) -> Result<(), SessionError> {
        self.inner.complete_session(actual_usage_minutes).await
    }

    /// Runs the termination path (idempotent)
    pub async fn end_session(&self, reason: EndReason) {
        self.inner.end_session(reason).await;
    }

    /// Host visibility forwarding: pauses while hidden and resumes when
    /// visible, when `pause_on_hidden` is configured
    pub fn handle_visibility_change(&self, hidden: bool) {
        if !self.inner.config.pause_on_hidden {
            return;
        }
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return;
        }
        let result = if hidden {
            self.pause_timer()
        } else {
            self.resume_timer()
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "Visibility change ignored");
        }
    }

    /// Tears down every owned component without running the
    /// termination path
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// The current session record, when one exists
    pub fn session(&self) -> Option<SessionRecord> {
        self.inner.record.lock().expect("controller lock poisoned").clone()
    }

    /// Remaining seconds on the local countdown
    pub fn remaining_seconds(&self) -> Option<u64> {
        let guard = self.inner.timer.lock().expect("controller lock poisoned");
        guard.as_ref().map(|timer| timer.remaining_seconds())
    }

    /// Remaining time formatted for display (`mm:ss` / `hh:mm:ss`)
    pub fn format_remaining(&self) -> Option<String> {
        let guard = self.inner.timer.lock().expect("controller lock poisoned");
        guard.as_ref().map(|timer| timer.format_remaining())
    }

    pub fn is_timer_running(&self) -> bool {
        let guard = self.inner.timer.lock().expect("controller lock poisoned");
        guard.as_ref().map(|timer| timer.is_running()).unwrap_or(false)
    }

    /// True when this context is responsible for server heartbeats:
    /// the master when sync is enabled, the sole context otherwise
    pub fn is_master_tab(&self) -> bool {
        let guard = self.inner.sync.lock().expect("controller lock poisoned");
        guard.as_ref().map(|bus| bus.is_master_tab()).unwrap_or(true)
    }

    pub fn is_heartbeat_running(&self) -> bool {
        let guard = self.inner.heartbeat.lock().expect("controller lock poisoned");
        guard.as_ref().map(|hb| hb.is_running()).unwrap_or(false)
    }

    /// True once the termination path has run
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }
}

impl ControllerInner {
    async fn initialize(self: &Arc<Self>) -> Result<SessionRecord, SessionError> {
        // 1. locate the token: URL query parameter, else storage
        let token = self.locate_token().ok_or(SessionError::MissingToken)?;

        // 2. persist for redirect survival
        self.platform.store.set(TOKEN_STORAGE_KEY, &token);
        *self.token.lock().expect("controller lock poisoned") = Some(token.clone());

        // 3. verify
        let claims = if self.config.use_backend_validation {
            let api = self.api_for(&token);
            let response = api.validate(&token).await?;
            if !response.valid {
                return Err(SessionError::SessionInvalid {
                    reason: response
                        .error
                        .unwrap_or_else(|| "session rejected by server".to_string()),
                });
            }
            let claims = codec::decode_claims(&token)?;
            // the application binding is still enforced locally after a
            // server-side validation
            if let Some(expected) = self.expected_application_id() {
                if claims.application_id.as_deref() != Some(expected) {
                    return Err(SessionError::ApplicationMismatch);
                }
            }
            claims
        } else {
            let verifier =
                SignatureVerifier::new(&self.config.jwks_uri, self.config.page_url.as_deref());
            verifier
                .verify(
                    &token,
                    &self.config.expected_issuer,
                    self.expected_application_id(),
                )
                .await?
        };

        // 4. session record
        let record = SessionRecord::from_claims(&claims)?;

        // 5. remaining time
        let remaining = record.remaining_seconds();
        if remaining == 0 {
            return Err(SessionError::SessionExpired);
        }

        // 6. strict start hook: a failure means the session never started
        hooks::run_strict(
            "onSessionStart",
            self.config.hooks.on_session_start.as_ref(),
            record.clone(),
            self.hook_timeout(),
        )
        .await?;

        *self.record.lock().expect("controller lock poisoned") = Some(record.clone());

        // 7. countdown timer
        let timer = self.build_timer(remaining);
        *self.timer.lock().expect("controller lock poisoned") = Some(Arc::clone(&timer));

        // 8. heartbeat loop
        if self.config.enable_heartbeat {
            let api = self.api_for(&token);
            let heartbeat = self.build_heartbeat(api, &record.session_id);
            *self.heartbeat.lock().expect("controller lock poisoned") = Some(heartbeat);
        }

        // 9. sync bus
        if self.config.enable_tab_sync {
            let bus = self.build_sync_bus(&record.session_id);
            *self.sync.lock().expect("controller lock poisoned") = Some(bus);
        }

        // 10. visibility handling needs no construction; the host
        // forwards events into handle_visibility_change

        self.initialized.store(true, Ordering::SeqCst);

        // 11. autostart
        if self.config.auto_start {
            timer.start();
            if self.config.enable_heartbeat {
                let is_master = {
                    let guard = self.sync.lock().expect("controller lock poisoned");
                    guard.as_ref().map(|bus| bus.is_master_tab()).unwrap_or(true)
                };
                if !self.config.enable_tab_sync || is_master {
                    let guard = self.heartbeat.lock().expect("controller lock poisoned");
                    if let Some(heartbeat) = guard.as_ref() {
                        heartbeat.start();
                    }
                }
            }
        }

        // 12. start event
        self.config.events.emit_start(&record);
        tracing::info!(
            session_id = %record.session_id,
            remaining_seconds = remaining,
            "Session initialized"
        );
        Ok(record)
    }

    fn locate_token(&self) -> Option<String> {
        if let Some(page_url) = &self.config.page_url {
            if let Ok(url) = reqwest::Url::parse(page_url) {
                let param = self.config.jwt_param_name.as_str();
                if let Some((_, value)) = url.query_pairs().find(|(key, _)| key.as_ref() == param) {
                    if !value.is_empty() {
                        tracing::debug!("Session token found in page URL");
                        return Some(value.into_owned());
                    }
                }
            }
        }
        let stored = self.platform.store.get(TOKEN_STORAGE_KEY);
        if stored.is_some() {
            tracing::debug!("Session token found in storage");
        }
        stored
    }

    fn expected_application_id(&self) -> Option<&str> {
        self.config
            .application_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    fn api_for(&self, token: &str) -> Arc<SessionApi> {
        let mut guard = self.api.lock().expect("controller lock poisoned");
        if let Some(api) = guard.as_ref() {
            return Arc::clone(api);
        }
        let api = Arc::new(SessionApi::new(&self.config.api_endpoint, token));
        *guard = Some(Arc::clone(&api));
        api
    }

    fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.config.hook_timeout_ms)
    }

    fn ending_delay(&self) -> Duration {
        Duration::from_millis(self.config.ending_delay_ms)
    }

    fn require_initialized(&self) -> Result<(), SessionError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::NotInitialized)
        }
    }

    fn with_timer(&self, f: impl FnOnce(&CountdownTimer)) {
        let guard = self.timer.lock().expect("controller lock poisoned");
        if let Some(timer) = guard.as_ref() {
            f(timer);
        }
    }

    fn broadcast(&self, message: SyncMessage) {
        let guard = self.sync.lock().expect("controller lock poisoned");
        if let Some(bus) = guard.as_ref() {
            bus.broadcast(message);
        }
    }

    fn build_timer(self: &Arc<Self>, remaining: u64) -> Arc<CountdownTimer> {
        let warn_weak = Arc::downgrade(self);
        let end_weak = Arc::downgrade(self);
        let callbacks = TimerCallbacks {
            on_warning: Some(Arc::new(move |remaining_seconds| {
                let weak = warn_weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_timer_warning(remaining_seconds).await;
                    }
                })
            })),
            on_end: Some(Arc::new(move || {
                let weak = end_weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.end_session(EndReason::Expired).await;
                    }
                })
            })),
        };
        Arc::new(CountdownTimer::new(
            remaining,
            self.config.warning_threshold_seconds,
            callbacks,
        ))
    }

    fn build_heartbeat(self: &Arc<Self>, api: Arc<SessionApi>, session_id: &str) -> Arc<HeartbeatLoop> {
        let sync_weak = Arc::downgrade(self);
        let on_sync: crate::heartbeat::SyncCallback = Arc::new(move |remaining| {
            if let Some(inner) = sync_weak.upgrade() {
                inner.with_timer(|timer| timer.update_remaining(remaining as i64));
            }
        });
        let error_weak = Arc::downgrade(self);
        let on_error: crate::heartbeat::ErrorCallback = Arc::new(move |err| {
            if let Some(inner) = error_weak.upgrade() {
                inner.config.events.emit_error(&err);
            }
        });
        Arc::new(HeartbeatLoop::new(
            api,
            session_id,
            Duration::from_secs(self.config.heartbeat_interval_seconds),
            self.config.max_heartbeat_failures,
            Some(on_sync),
            Some(on_error),
        ))
    }

    fn build_sync_bus(self: &Arc<Self>, session_id: &str) -> Arc<TabSyncBus> {
        let message_weak = Arc::downgrade(self);
        let on_message: MessageHandler = Arc::new(move |message| {
            let weak = message_weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_sync_message(message).await;
                }
            })
        });

        let master_weak = Arc::downgrade(self);
        let on_master_change: MasterChangeHandler = Arc::new(move |is_master| {
            let Some(inner) = master_weak.upgrade() else {
                return;
            };
            if is_master && inner.config.enable_heartbeat && !inner.ended.load(Ordering::SeqCst) {
                let guard = inner.heartbeat.lock().expect("controller lock poisoned");
                if let Some(heartbeat) = guard.as_ref() {
                    tracing::info!("Promoted to master, taking over the heartbeat");
                    heartbeat.start();
                }
            }
        });

        Arc::new(TabSyncBus::new(
            session_id,
            self.platform.clone(),
            self.config.sync_transport,
            self.config.sync_options.clone(),
            on_message,
            on_master_change,
        ))
    }

    /// Peer messages map onto local timer operations; receivers are
    /// idempotent and out-of-order tolerant, so a `timer_update` landing
    /// after `end` is ignored by the stopped timer
    async fn on_sync_message(self: &Arc<Self>, message: SyncMessage) {
        match message {
            SyncMessage::Pause => self.with_timer(|timer| timer.pause()),
            SyncMessage::Resume => self.with_timer(|timer| timer.resume()),
            SyncMessage::TimerUpdate { remaining_seconds } => {
                self.with_timer(|timer| timer.update_remaining(remaining_seconds as i64))
            }
            SyncMessage::End => self.end_session(EndReason::Manual).await,
            SyncMessage::Unknown => {}
        }
    }

    async fn on_timer_warning(self: &Arc<Self>, remaining_seconds: u64) {
        hooks::run_lenient(
            "onSessionWarning",
            self.config.hooks.on_session_warning.as_ref(),
            SessionWarningContext { remaining_seconds },
            self.hook_timeout(),
        )
        .await;
        self.show_warning_modal(remaining_seconds).await;
        self.config.events.emit_warning(remaining_seconds);
    }

    async fn show_warning_modal(self: &Arc<Self>, remaining_seconds: u64) {
        let extend_weak = Arc::downgrade(self);
        let on_extend: ModalCallback = Arc::new(move || {
            let weak = extend_weak.clone();
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match inner.extend_session(MODAL_EXTEND_MINUTES).await {
                    Ok(_) => inner.modal.hide().await,
                    Err(err) => {
                        tracing::warn!(error = %err, "Extension from modal failed");
                        let url = inner.extension_url();
                        let navigator = Arc::clone(&inner.navigator);
                        let redirect: Arc<dyn Fn() + Send + Sync> =
                            Arc::new(move || navigator.redirect(&url));
                        inner
                            .modal
                            .show_ending_message(redirect, inner.ending_delay())
                            .await;
                    }
                }
            })
        });

        let end_weak = Arc::downgrade(self);
        let on_end: ModalCallback = Arc::new(move || {
            let weak = end_weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.end_session(EndReason::Manual).await;
                }
            })
        });

        self.modal
            .show(ModalRequest {
                remaining_seconds,
                theme_mode: self.config.theme_mode.clone(),
                custom_styles: self.config.custom_styles.clone(),
                on_extend,
                on_end,
            })
            .await;
    }

    /// Marketplace URL the user lands on when an extension attempt
    /// fails, carrying the session id
    fn extension_url(&self) -> String {
        let session_id = self
            .record
            .lock()
            .expect("controller lock poisoned")
            .as_ref()
            .map(|record| record.session_id.clone())
            .unwrap_or_default();
        format!(
            "{}/sessions/{}/extend",
            self.config.marketplace_url.trim_end_matches('/'),
            session_id
        )
    }

    async fn extend_session(self: &Arc<Self>, additional_minutes: u64) -> Result<i64, SessionError> {
        let result = self.extend_session_inner(additional_minutes).await;
        if let Err(err) = &result {
            self.config.events.emit_error(err);
        }
        result
    }

    async fn extend_session_inner(
        self: &Arc<Self>,
        additional_minutes: u64,
    ) -> Result<i64, SessionError> {
        let (session_id, token) = self.active_session()?;

        let api = self.api_for(&token);
        let response = api.renew(&session_id, additional_minutes).await?;
        let new_expires_at = response.new_expires_at;

        let new_remaining = {
            let mut guard = self.record.lock().expect("controller lock poisoned");
            let record = guard.as_mut().ok_or(SessionError::NoSession)?;
            record.exp = new_expires_at;
            record.remaining_seconds()
        };

        self.with_timer(|timer| timer.update_remaining(new_remaining as i64));
        self.broadcast(SyncMessage::TimerUpdate {
            remaining_seconds: new_remaining,
        });

        hooks::run_lenient(
            "onSessionExtend",
            self.config.hooks.on_session_extend.as_ref(),
            SessionExtendContext {
                additional_minutes,
                new_expires_at,
            },
            self.hook_timeout(),
        )
        .await;

        tracing::info!(
            session_id = %session_id,
            additional_minutes,
            new_expires_at,
            "Session extended"
        );
        Ok(new_expires_at)
    }

    async fn complete_session(
        self: &Arc<Self>,
        actual_usage_minutes: Option<u64>,
    ) -> Result<(), SessionError> {
        let result = self.complete_session_inner(actual_usage_minutes).await;
        if let Err(err) = &result {
            self.config.events.emit_error(err);
        }
        result
    }

    async fn complete_session_inner(
        self: &Arc<Self>,
        actual_usage_minutes: Option<u64>,
    ) -> Result<(), SessionError> {
        let (session_id, token) = self.active_session()?;
        let api = self.api_for(&token);
        api.complete(&session_id, actual_usage_minutes, None).await?;
        self.end_session(EndReason::Manual).await;
        Ok(())
    }

    fn active_session(&self) -> Result<(String, String), SessionError> {
        let record = self.record.lock().expect("controller lock poisoned");
        let token = self.token.lock().expect("controller lock poisoned");
        match (record.as_ref(), token.as_ref()) {
            (Some(record), Some(token)) => Ok((record.session_id.clone(), token.clone())),
            _ => Err(SessionError::NoSession),
        }
    }

    /// The termination path: one deterministic sequence regardless of
    /// trigger. Idempotent; a repeat call only re-shows the ending
    /// message.
    async fn end_session(self: &Arc<Self>, reason: EndReason) {
        if self.ended.swap(true, Ordering::SeqCst) {
            tracing::debug!("Termination already ran, re-showing ending message");
            self.spawn_ending_message();
            return;
        }
        tracing::info!(reason = %reason, "Ending session");

        // 1. terminal context
        let context = {
            let guard = self.record.lock().expect("controller lock poisoned");
            match guard.as_ref() {
                Some(record) => SessionEndContext {
                    session_id: record.session_id.clone(),
                    user_id: record.user_id.clone(),
                    reason,
                    actual_duration_minutes: record.actual_duration_minutes(),
                },
                None => SessionEndContext {
                    session_id: String::new(),
                    user_id: String::new(),
                    reason,
                    actual_duration_minutes: 0,
                },
            }
        };

        // 2. lenient end hook
        hooks::run_lenient(
            "onSessionEnd",
            self.config.hooks.on_session_end.as_ref(),
            context,
            self.hook_timeout(),
        )
        .await;

        // 3. stop timer and heartbeat
        self.with_timer(|timer| timer.stop());
        {
            let guard = self.heartbeat.lock().expect("controller lock poisoned");
            if let Some(heartbeat) = guard.as_ref() {
                heartbeat.stop();
            }
        }

        // 4. tell the peers
        self.broadcast(SyncMessage::End);

        // 5. storage hygiene
        self.platform.store.remove(TOKEN_STORAGE_KEY);

        // 6. host event
        self.config.events.emit_end();

        // 7. ending message, then redirect back to the marketplace
        self.spawn_ending_message();
    }

    /// Asks the modal to display the terminal state and invoke the
    /// marketplace redirect after the configured delay; detached so the
    /// termination path never blocks on UI
    fn spawn_ending_message(&self) {
        let modal = Arc::clone(&self.modal);
        let navigator = Arc::clone(&self.navigator);
        let url = self.config.marketplace_url.clone();
        let delay = self.ending_delay();
        tokio::spawn(async move {
            let redirect: Arc<dyn Fn() + Send + Sync> =
                Arc::new(move || navigator.redirect(&url));
            modal.show_ending_message(redirect, delay).await;
        });
    }

    fn destroy(&self) {
        self.with_timer(|timer| timer.stop());
        if let Some(heartbeat) = self
            .heartbeat
            .lock()
            .expect("controller lock poisoned")
            .take()
        {
            heartbeat.stop();
        }
        if let Some(bus) = self.sync.lock().expect("controller lock poisoned").take() {
            bus.destroy();
        }
        *self.timer.lock().expect("controller lock poisoned") = None;
        *self.record.lock().expect("controller lock poisoned") = None;
        *self.token.lock().expect("controller lock poisoned") = None;
        *self.api.lock().expect("controller lock poisoned") = None;
        self.initialized.store(false, Ordering::SeqCst);
        tracing::debug!("Session controller destroyed");
    }
}
