use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    domain::{
        conversation::ConversationKey,
        message::{DeliveryState, Message, MessageId},
    },
    messaging::error::{ChatError, ChatResult},
};

use super::{ensure_failed, HistoryPage};

/// In-memory index shared by the store implementations.
///
/// Each conversation is a sorted `Arc<Vec<_>>`; writers go through
/// `Arc::make_mut`, so pages handed out earlier keep their own snapshot.
#[derive(Debug, Default)]
pub(super) struct ConversationLogs {
    logs: HashMap<ConversationKey, Arc<Vec<Message>>>,
}

impl ConversationLogs {
    pub(super) fn contains(&self, key: &ConversationKey, id: &MessageId) -> bool {
        self.find(key, id).is_some()
    }

    pub(super) fn insert(&mut self, message: Message) -> ChatResult<()> {
        if self.contains(&message.conversation_key, &message.id) {
            return Err(ChatError::InvalidMessage {
                reason: format!("message id {} already exists", message.id),
            });
        }

        let log = self
            .logs
            .entry(message.conversation_key.clone())
            .or_default();
        let position =
            log.partition_point(|existing| existing.chronological_cmp(&message) != Ordering::Greater);
        Arc::make_mut(log).insert(position, message);
        Ok(())
    }

    pub(super) fn page(
        &self,
        key: &ConversationKey,
        limit: usize,
        before: DateTime<Utc>,
    ) -> HistoryPage {
        let Some(log) = self.logs.get(key) else {
            return HistoryPage::empty();
        };

        let end = log.partition_point(|message| message.sent_at <= before);
        let start = end.saturating_sub(limit);
        HistoryPage::new(Arc::clone(log), start..end)
    }

    pub(super) fn get(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        self.find(key, id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("message", id.as_str()))
    }

    /// Current log of a conversation, shared with the index.
    pub(super) fn snapshot(&self, key: &ConversationKey) -> Option<Arc<Vec<Message>>> {
        self.logs.get(key).cloned()
    }

    /// Puts back a log taken with `snapshot`.
    pub(super) fn restore(&mut self, key: &ConversationKey, snapshot: Option<Arc<Vec<Message>>>) {
        match snapshot {
            Some(log) => {
                self.logs.insert(key.clone(), log);
            }
            None => {
                self.logs.remove(key);
            }
        }
    }

    pub(super) fn remove_conversation(&mut self, key: &ConversationKey) -> usize {
        self.logs.remove(key).map_or(0, |log| log.len())
    }

    pub(super) fn set_failed_state(
        &mut self,
        key: &ConversationKey,
        id: &MessageId,
        state: DeliveryState,
    ) -> ChatResult<Message> {
        let log = self
            .logs
            .get_mut(key)
            .ok_or_else(|| ChatError::not_found("message", id.as_str()))?;
        let index = position_of(log, id)?;
        ensure_failed(&log[index])?;

        let message = &mut Arc::make_mut(log)[index];
        message.delivery_state = state;
        Ok(message.clone())
    }

    pub(super) fn remove_failed(
        &mut self,
        key: &ConversationKey,
        id: &MessageId,
    ) -> ChatResult<Message> {
        let log = self
            .logs
            .get_mut(key)
            .ok_or_else(|| ChatError::not_found("message", id.as_str()))?;
        let index = position_of(log, id)?;
        ensure_failed(&log[index])?;

        let removed = Arc::make_mut(log).remove(index);
        if log.is_empty() {
            self.logs.remove(key);
        }
        Ok(removed)
    }

    pub(super) fn messages(&self, key: &ConversationKey) -> &[Message] {
        self.logs
            .get(key)
            .map(|log| log.as_slice())
            .unwrap_or_default()
    }

    fn find(&self, key: &ConversationKey, id: &MessageId) -> Option<&Message> {
        self.logs.get(key)?.iter().find(|message| &message.id == id)
    }
}

fn position_of(log: &[Message], id: &MessageId) -> ChatResult<usize> {
    log.iter()
        .position(|message| &message.id == id)
        .ok_or_else(|| ChatError::not_found("message", id.as_str()))
}
