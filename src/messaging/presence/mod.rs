//! Typing presence: sender-side debounce channel and receiver-side tracking.

mod channel;
mod expiry;
mod tracker;

pub use channel::{TypingChannel, DEFAULT_TYPING_EXPIRY};
pub use expiry::{ExpiryWorkerStartError, TypingExpiryWorker};
pub use tracker::RemoteTypingTracker;
