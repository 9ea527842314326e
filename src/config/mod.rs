//! Configuration Management
//!
//! All controller options with their defaults. A host typically builds
//! a config with struct-update syntax over [`SessionConfig::default`],
//! setting the endpoints and whatever collaborators it implements.

use std::sync::Arc;

use crate::platform::{Navigator, Platform};
use crate::session::events::SessionEvents;
use crate::session::hooks::SessionHooks;
use crate::session::modal::SessionModal;
use crate::sync::{SyncOptions, SyncTransport};

/// Default URL query parameter carrying the session token
pub const DEFAULT_JWT_PARAM_NAME: &str = "gwSession";

/// Default warning threshold: 5 minutes before expiry
pub const DEFAULT_WARNING_THRESHOLD_SECS: u64 = 300;

/// Default heartbeat cadence
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default per-hook timeout
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 5_000;

/// Default time the ending message stays up before the redirect
pub const DEFAULT_ENDING_DELAY_MS: u64 = 3_000;

/// Session controller configuration
#[derive(Clone)]
pub struct SessionConfig {
    /// URI of the marketplace public-key set; site-relative paths
    /// resolve against `page_url`
    pub jwks_uri: String,
    /// Issuer the token's `iss` claim must equal
    pub expected_issuer: String,
    /// Name of the URL query parameter holding the token
    pub jwt_param_name: String,
    /// Base URL for heartbeat, validate, renew, complete
    pub api_endpoint: String,
    /// Remaining seconds at which the one-shot warning fires
    pub warning_threshold_seconds: u64,
    /// Expected `applicationId` claim; enforced when non-empty
    pub application_id: Option<String>,
    /// Start the timer automatically after a successful `initialize()`
    pub auto_start: bool,
    /// Run the heartbeat loop
    pub enable_heartbeat: bool,
    /// Heartbeat cadence in seconds
    pub heartbeat_interval_seconds: u64,
    /// Consecutive heartbeat failures tolerated before the loop stops
    pub max_heartbeat_failures: u32,
    /// Enable the cross-context sync bus
    pub enable_tab_sync: bool,
    /// Sync transport; `Broadcast` unless the host only has storage
    pub sync_transport: SyncTransport,
    /// Master-election timing
    pub sync_options: SyncOptions,
    /// Pause the timer while the page is hidden
    pub pause_on_hidden: bool,
    /// Delegate initial validation to the server instead of local JWKS
    pub use_backend_validation: bool,
    /// URL control returns to on terminal state
    pub marketplace_url: String,
    /// Forwarded to the modal
    pub theme_mode: Option<String>,
    /// Forwarded to the modal
    pub custom_styles: Option<String>,
    /// Host lifecycle hooks
    pub hooks: SessionHooks,
    /// Per-hook timeout in milliseconds
    pub hook_timeout_ms: u64,
    /// Time the ending message stays up before the redirect, in
    /// milliseconds
    pub ending_delay_ms: u64,
    /// Host event callbacks
    pub events: SessionEvents,
    /// URL of the hosting page; the token parameter is read from its
    /// query string
    pub page_url: Option<String>,
    /// Storage/channel substrate; defaults to the process-global profile
    pub platform: Option<Platform>,
    /// Warning/ending modal implementation
    pub modal: Option<Arc<dyn SessionModal>>,
    /// Page-navigation implementation
    pub navigator: Option<Arc<dyn Navigator>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwks_uri: String::new(),
            expected_issuer: String::new(),
            jwt_param_name: DEFAULT_JWT_PARAM_NAME.to_string(),
            api_endpoint: String::new(),
            warning_threshold_seconds: DEFAULT_WARNING_THRESHOLD_SECS,
            application_id: None,
            auto_start: true,
            enable_heartbeat: false,
            heartbeat_interval_seconds: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            max_heartbeat_failures: crate::heartbeat::DEFAULT_MAX_FAILURES,
            enable_tab_sync: false,
            sync_transport: SyncTransport::Broadcast,
            sync_options: SyncOptions::default(),
            pause_on_hidden: false,
            use_backend_validation: false,
            marketplace_url: String::new(),
            theme_mode: None,
            custom_styles: None,
            hooks: SessionHooks::default(),
            hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
            ending_delay_ms: DEFAULT_ENDING_DELAY_MS,
            events: SessionEvents::default(),
            page_url: None,
            platform: None,
            modal: None,
            navigator: None,
        }
    }
}
