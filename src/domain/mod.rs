//! Domain layer: identities, conversations, messages and typing signals.

pub mod conversation;
pub mod events;
pub mod identity;
pub mod message;
pub mod typing;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
