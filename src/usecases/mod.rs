//! Use case layer: application workflows and orchestration.

pub mod bootstrap;
pub mod context;
pub mod conversation;
pub mod list_contacts;
pub mod load_history;
pub mod send_message;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
