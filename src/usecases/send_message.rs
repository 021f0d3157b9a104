//! Sending, retrying and discarding outbound messages.
//!
//! The transport is tried first and the message is stored with the state the
//! transport reported. A transport failure still stores the message as
//! `Failed` so it can be retried or discarded later.

use chrono::Utc;

use crate::{
    domain::{
        conversation::ConversationKey,
        events::InboundEvent,
        message::{validate_text, DeliveryState, Message, MessageDraft, MessageId},
    },
    messaging::error::{ChatError, ChatResult},
};

use super::conversation::ConversationService;

const SEND_TRANSPORT_FAILED: &str = "SEND_TRANSPORT_FAILED";

impl ConversationService {
    pub fn send(&self, key: &ConversationKey, text: &str) -> ChatResult<Message> {
        let me = self.authorize(key)?;
        let text = validate_text(text)?;

        self.typing.end_typing(&me.id, key);

        let outbound = as_relayed(Message {
            id: MessageId::generate(),
            conversation_key: key.clone(),
            sender_id: me.id,
            text: text.to_owned(),
            sent_at: Utc::now(),
            delivery_state: DeliveryState::Sent,
        });
        let outcome = self.transport.send(&outbound);
        let state = match &outcome {
            Ok(receipt) => receipt.delivery_state(),
            Err(_) => DeliveryState::Failed,
        };

        let stored = self
            .store
            .append(key, MessageDraft::from_message(&outbound).with_state(state))?;
        self.echo(&stored);

        match outcome {
            Ok(_) => {
                tracing::info!(
                    conversation = %key,
                    message_id = %stored.id,
                    state = stored.delivery_state.as_label(),
                    "message sent"
                );
                Ok(stored)
            }
            Err(source) => {
                tracing::warn!(
                    code = SEND_TRANSPORT_FAILED,
                    conversation = %key,
                    message_id = %stored.id,
                    error = %source,
                    "message kept as failed"
                );
                Err(ChatError::SendFailed {
                    message: Box::new(stored),
                    source,
                })
            }
        }
    }

    /// Re-sends a `Failed` message written by the current identity.
    pub fn retry(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        let message = self.own_failed_message(key, id)?;

        match self.transport.send(&as_relayed(message.clone())) {
            Ok(receipt) => {
                let updated = self
                    .store
                    .update_delivery(key, id, receipt.delivery_state())?;
                self.echo(&updated);
                tracing::info!(
                    conversation = %key,
                    message_id = %id,
                    state = updated.delivery_state.as_label(),
                    "message retried"
                );
                Ok(updated)
            }
            Err(source) => {
                tracing::warn!(
                    code = SEND_TRANSPORT_FAILED,
                    conversation = %key,
                    message_id = %id,
                    error = %source,
                    "retry failed"
                );
                Err(ChatError::SendFailed {
                    message: Box::new(message),
                    source,
                })
            }
        }
    }

    pub fn discard(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        self.own_failed_message(key, id)?;
        let removed = self.store.discard(key, id)?;

        tracing::info!(conversation = %key, message_id = %id, "failed message discarded");
        Ok(removed)
    }

    fn own_failed_message(&self, key: &ConversationKey, id: &MessageId) -> ChatResult<Message> {
        let me = self.authorize(key)?;
        let message = self.store.get(key, id)?;

        if message.sender_id != me.id {
            return Err(ChatError::Unauthorized {
                reason: "only the author can retry or discard a message",
            });
        }
        if message.delivery_state != DeliveryState::Failed {
            return Err(ChatError::InvalidMessage {
                reason: format!(
                    "message {id} is {}, only failed messages can be retried or discarded",
                    message.delivery_state.as_label()
                ),
            });
        }

        Ok(message)
    }

    fn echo(&self, message: &Message) {
        let report = self
            .dispatcher
            .dispatch(&InboundEvent::Message(message.clone()));
        tracing::debug!(
            message_id = %message.id,
            delivered = report.delivered,
            failed = report.failed,
            "local echo dispatched"
        );
    }
}

/// The copy a recipient receives: anything that reaches it is delivered.
fn as_relayed(mut message: Message) -> Message {
    message.delivery_state = DeliveryState::Delivered;
    message
}
