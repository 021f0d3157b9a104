//! Ordered, per-conversation message log.

mod journal;
mod log;
mod memory;

use std::{ops::Range, sync::Arc};

use chrono::{DateTime, Utc};

use crate::domain::{
    conversation::ConversationKey,
    message::{validate_text, DeliveryState, Message, MessageDraft, MessageId},
};

use super::error::{ChatError, ChatResult};

pub use journal::JournalMessageStore;
pub use memory::MemoryMessageStore;

pub trait MessageStore: Send + Sync {
    /// Validates and stores a message, assigning id and timestamp when absent.
    fn append(&self, key: &ConversationKey, draft: MessageDraft) -> ChatResult<Message>;

    /// Up to `limit` most recent messages with `sent_at <= before` (default: now), oldest first.
    fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> ChatResult<HistoryPage>;

    /// Looks up one message of the conversation by id.
    fn get(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message>;

    /// Removes every message of the conversation; unknown keys delete nothing.
    fn delete_conversation(&self, key: &ConversationKey) -> ChatResult<usize>;

    /// Moves a `Failed` message to a new delivery state.
    fn update_delivery(
        &self,
        key: &ConversationKey,
        id: &MessageId,
        state: DeliveryState,
    ) -> ChatResult<Message>;

    /// Removes a single `Failed` message.
    fn discard(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message>;
}

/// Page of history backed by an immutable snapshot of the conversation log.
///
/// Iterating never observes appends made after the page was produced, and the
/// page can be iterated any number of times.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    snapshot: Arc<Vec<Message>>,
    range: Range<usize>,
}

impl HistoryPage {
    pub fn empty() -> Self {
        Self {
            snapshot: Arc::new(Vec::new()),
            range: 0..0,
        }
    }

    fn new(snapshot: Arc<Vec<Message>>, range: Range<usize>) -> Self {
        Self { snapshot, range }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.snapshot[self.range.clone()].iter()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.iter().next_back()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a HistoryPage {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn materialize(key: &ConversationKey, draft: MessageDraft) -> ChatResult<Message> {
    let text = validate_text(&draft.text)?.to_owned();

    Ok(Message {
        id: draft.id.unwrap_or_else(MessageId::generate),
        conversation_key: key.clone(),
        sender_id: draft.sender_id,
        text,
        sent_at: draft.sent_at.unwrap_or_else(Utc::now),
        delivery_state: draft.delivery_state,
    })
}

fn ensure_failed(message: &Message) -> ChatResult<()> {
    if message.delivery_state == DeliveryState::Failed {
        Ok(())
    } else {
        Err(ChatError::InvalidMessage {
            reason: format!(
                "message {} is {}, only failed messages can change",
                message.id,
                message.delivery_state.as_label()
            ),
        })
    }
}
