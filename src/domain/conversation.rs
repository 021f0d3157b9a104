use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Order-independent identifier of a one-to-one conversation.
///
/// The two participant ids are stored sorted, so `between(a, b)` and
/// `between(b, a)` produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    low: String,
    high: String,
}

impl ConversationKey {
    pub fn between(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }

    pub fn involves(&self, id: &str) -> bool {
        self.low == id || self.high == id
    }

    /// Returns the other participant, or `None` when `id` is not a member.
    pub fn peer_of(&self, id: &str) -> Option<&str> {
        if self.low == id {
            Some(&self.high)
        } else if self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }

    /// Filesystem-safe name derived from both participants.
    pub fn file_stem(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}\n{}", self.low, self.high))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
