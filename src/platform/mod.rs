//! Host platform substrate
//!
//! The SDK runs embedded in a host shell. Everything the browser gives
//! a tab for free is a seam here: profile-scoped persistent storage with
//! change events ([`store`]), named cross-context broadcast channels
//! ([`channels`]), and page navigation ([`Navigator`]).
//!
//! All SDK instances sharing one [`Platform`] behave like N tabs of one
//! browser profile; the process-global default platform is the ambient
//! profile a host gets when it does not supply its own.

pub mod channels;
pub mod store;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use channels::ChannelRegistry;
pub use store::{MemoryStore, SharedStore, StoreEvent};

/// Handle to the shared substrate of one logical browser profile
#[derive(Clone)]
pub struct Platform {
    /// Profile-scoped persistent key-value storage
    pub store: Arc<dyn SharedStore>,
    /// Named broadcast channels between contexts of this profile
    pub channels: ChannelRegistry,
}

impl Platform {
    /// Creates an isolated in-memory platform
    ///
    /// Used by hosts that manage their own profile scoping, and by
    /// tests that need independent "browser profiles".
    pub fn new_in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            channels: ChannelRegistry::new(),
        }
    }

    /// Returns the process-wide default platform
    ///
    /// Controllers constructed without an explicit platform share this
    /// one, which is what makes two instances in the same process see
    /// each other the way two tabs of one profile do.
    pub fn global() -> Platform {
        static GLOBAL: Lazy<Platform> = Lazy::new(Platform::new_in_memory);
        GLOBAL.clone()
    }
}

/// Page-navigation seam
///
/// The termination path hands control back to the marketplace through
/// this trait; a webview host implements it with a real navigation.
pub trait Navigator: Send + Sync {
    /// Navigates the host page to `url`
    fn redirect(&self, url: &str);
}

/// Default navigator that only records the intent in the log
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn redirect(&self, url: &str) {
        tracing::info!(url = %url, "Redirect requested (no host navigator installed)");
    }
}
