use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::ConversationKey;

/// Upper bound for message text, counted in characters after trimming.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Time-ordered id; lexical order of generated ids follows creation order.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Accepted by the transport.
    Sent,
    /// Handed to the recipient's live connection.
    Delivered,
    /// Transport rejected or timed out; kept for retry or discard.
    Failed,
}

impl DeliveryState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_key: ConversationKey,
    pub sender_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub delivery_state: DeliveryState,
}

impl Message {
    /// Total order inside a conversation: `sent_at`, then `id`.
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.sent_at
            .cmp(&other.sent_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Message as handed to a store; missing id and timestamp are assigned on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub id: Option<MessageId>,
    pub sender_id: String,
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivery_state: DeliveryState,
}

impl MessageDraft {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id: sender_id.into(),
            text: text.into(),
            sent_at: None,
            delivery_state: DeliveryState::Sent,
        }
    }

    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = Some(sent_at);
        self
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_state(mut self, state: DeliveryState) -> Self {
        self.delivery_state = state;
        self
    }

    pub fn from_message(message: &Message) -> Self {
        Self {
            id: Some(message.id.clone()),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            sent_at: Some(message.sent_at),
            delivery_state: message.delivery_state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextViolation {
    Empty,
    TooLong { chars: usize },
}

impl fmt::Display for TextViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("message text is empty"),
            Self::TooLong { chars } => write!(
                f,
                "message text has {chars} characters, limit is {MAX_MESSAGE_CHARS}"
            ),
        }
    }
}

/// Returns the trimmed text, or the rule it breaks.
pub fn validate_text(text: &str) -> Result<&str, TextViolation> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TextViolation::Empty);
    }

    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(TextViolation::TooLong { chars });
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: MessageId::from(id),
            conversation_key: ConversationKey::between("a", "b"),
            sender_id: "a".to_owned(),
            text: "hello".to_owned(),
            sent_at: Utc.timestamp_opt(secs, 0).single().expect("valid timestamp"),
            delivery_state: DeliveryState::Sent,
        }
    }

    #[test]
    fn orders_by_timestamp_then_id() {
        assert_eq!(msg("z", 1).chronological_cmp(&msg("a", 2)), Ordering::Less);
        assert_eq!(msg("a", 5).chronological_cmp(&msg("b", 5)), Ordering::Less);
        assert_eq!(msg("b", 5).chronological_cmp(&msg("b", 5)), Ordering::Equal);
    }

    #[test]
    fn generated_ids_follow_creation_order() {
        let first = MessageId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MessageId::generate();

        assert!(first < second);
    }

    #[test]
    fn validate_text_trims_and_rejects_blank() {
        assert_eq!(validate_text("  hi  "), Ok("hi"));
        assert_eq!(validate_text(""), Err(TextViolation::Empty));
        assert_eq!(validate_text(" \n\t "), Err(TextViolation::Empty));
    }

    #[test]
    fn validate_text_rejects_oversized_text() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);

        assert_eq!(
            validate_text(&long),
            Err(TextViolation::TooLong {
                chars: MAX_MESSAGE_CHARS + 1
            })
        );
        assert!(validate_text(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn delivery_state_serializes_in_snake_case() {
        let json = serde_json::to_string(&DeliveryState::Delivered).expect("serialize");

        assert_eq!(json, "\"delivered\"");
    }
}
