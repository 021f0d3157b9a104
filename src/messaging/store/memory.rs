use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::{
    domain::{
        conversation::ConversationKey,
        message::{DeliveryState, Message, MessageDraft, MessageId},
    },
    messaging::error::ChatResult,
};

use super::{log::ConversationLogs, materialize, HistoryPage, MessageStore};

/// Message store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    logs: RwLock<ConversationLogs>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn append(&self, key: &ConversationKey, draft: MessageDraft) -> ChatResult<Message> {
        let message = materialize(key, draft)?;
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message.clone())?;

        tracing::debug!(
            conversation = %key,
            message_id = %message.id,
            state = message.delivery_state.as_label(),
            "message appended"
        );
        Ok(message)
    }

    fn history(
        &self,
        key: &ConversationKey,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> ChatResult<HistoryPage> {
        let before = before.unwrap_or_else(Utc::now);
        Ok(self
            .logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .page(key, limit, before))
    }

    fn get(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        self.logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key, id)
    }

    fn delete_conversation(&self, key: &ConversationKey) -> ChatResult<usize> {
        let removed = self
            .logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_conversation(key);

        tracing::debug!(conversation = %key, removed, "conversation deleted");
        Ok(removed)
    }

    fn update_delivery(
        &self,
        key: &ConversationKey,
        id: &MessageId,
        state: DeliveryState,
    ) -> ChatResult<Message> {
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_failed_state(key, id, state)
    }

    fn discard(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        self.logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_failed(key, id)
    }
}
