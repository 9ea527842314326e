//! Session orchestration
//!
//! The controller owns the session record and wires verifier, timer,
//! heartbeat, and sync bus together; the sibling modules carry the
//! pieces of its public surface (record, hooks, events, modal contract).

pub mod controller;
pub mod events;
pub mod hooks;
pub mod modal;
pub mod record;

// Re-export
pub use controller::SessionController;
pub use events::SessionEvents;
pub use hooks::{EndReason, SessionEndContext, SessionExtendContext, SessionHooks, SessionWarningContext};
pub use modal::{ModalRequest, NullModal, SessionModal};
pub use record::SessionRecord;
