use chrono::{DateTime, Utc};

use super::conversation::ConversationKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Started,
    Ended,
}

/// Transient typing notification; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub conversation_key: ConversationKey,
    pub sender_id: String,
    pub state: TypingState,
    pub issued_at: DateTime<Utc>,
}

impl TypingSignal {
    pub fn now(conversation_key: ConversationKey, sender_id: &str, state: TypingState) -> Self {
        Self {
            conversation_key,
            sender_id: sender_id.to_owned(),
            state,
            issued_at: Utc::now(),
        }
    }
}
