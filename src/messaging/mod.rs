//! Messaging core: session, message store, typing presence, dispatch and transport.

pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod session;
pub mod store;
pub mod transport;

/// Returns the messaging module name for smoke checks.
pub fn module_name() -> &'static str {
    "messaging"
}
