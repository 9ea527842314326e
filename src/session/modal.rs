//! External modal contract
//!
//! The warning/ending UI is an external collaborator; the SDK only
//! drives it through this trait. Hosts install their own implementation
//! through the configuration; without one the [`NullModal`] records the
//! requests in the log and still honors the ending-message delay so the
//! redirect fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

/// Callback wired into the warning modal's buttons
pub type ModalCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Everything the warning modal needs to render and react
pub struct ModalRequest {
    pub remaining_seconds: u64,
    /// Forwarded from the configuration, interpreted by the modal only
    pub theme_mode: Option<String>,
    pub custom_styles: Option<String>,
    /// "Extend session" button
    pub on_extend: ModalCallback,
    /// "End session now" button
    pub on_end: ModalCallback,
}

/// The modal UI surface the SDK drives
#[async_trait]
pub trait SessionModal: Send + Sync {
    /// Presents the expiry warning with extend/end choices
    ///
    /// Must resolve once the UI is presented; button presses invoke the
    /// request's callbacks later. Blocking here would stall the
    /// countdown that triggered the warning.
    async fn show(&self, request: ModalRequest);

    /// Hides the warning, e.g. after a successful extension
    async fn hide(&self);

    /// Displays the terminal state for `delay`, then invokes
    /// `on_elapsed` (the SDK passes the marketplace redirect)
    async fn show_ending_message(&self, on_elapsed: Arc<dyn Fn() + Send + Sync>, delay: Duration);
}

/// Default modal used when the host installs none
pub struct NullModal;

#[async_trait]
impl SessionModal for NullModal {
    async fn show(&self, request: ModalRequest) {
        tracing::info!(
            remaining_seconds = request.remaining_seconds,
            "Session warning modal requested (no host modal installed)"
        );
    }

    async fn hide(&self) {}

    async fn show_ending_message(&self, on_elapsed: Arc<dyn Fn() + Send + Sync>, delay: Duration) {
        tracing::info!(delay_ms = delay.as_millis() as u64, "Session ending message requested");
        tokio::time::sleep(delay).await;
        on_elapsed();
    }
}
