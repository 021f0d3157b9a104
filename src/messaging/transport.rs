//! Transport seam: outbound relay of messages and typing signals.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use crate::domain::{
    conversation::ConversationKey,
    events::InboundEvent,
    message::{DeliveryState, Message},
    typing::TypingSignal,
};

use super::dispatcher::EventDispatcher;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport unavailable: {details}")]
    Unavailable { details: String },
    #[error("transport rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("transport timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

/// Acknowledgement returned for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReceipt {
    /// Accepted for later delivery.
    Accepted,
    /// Handed to the recipient's live connection.
    Delivered,
}

impl DeliveryReceipt {
    pub fn delivery_state(self) -> DeliveryState {
        match self {
            Self::Accepted => DeliveryState::Sent,
            Self::Delivered => DeliveryState::Delivered,
        }
    }
}

/// Outbound half of a connection. Reconnect and backoff belong to implementations.
pub trait Transport: Send + Sync {
    fn send(&self, message: &Message) -> Result<DeliveryReceipt, TransportError>;
    fn signal_typing(&self, signal: &TypingSignal) -> Result<(), TransportError>;
}

/// Routes events between identities connected inside one process.
#[derive(Debug, Clone, Default)]
pub struct InProcessRelay {
    peers: Arc<Mutex<HashMap<String, EventDispatcher>>>,
}

impl InProcessRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `dispatcher` as the live connection of `identity_id`, replacing any previous one.
    pub fn connect(&self, identity_id: &str, dispatcher: EventDispatcher) -> RelayConnection {
        self.peers()
            .insert(identity_id.to_owned(), dispatcher.clone());
        tracing::debug!(identity = identity_id, "relay connection opened");

        RelayConnection {
            relay: self.clone(),
            identity_id: identity_id.to_owned(),
            dispatcher,
        }
    }

    pub fn is_connected(&self, identity_id: &str) -> bool {
        self.peers().contains_key(identity_id)
    }

    fn route(&self, identity_id: &str) -> Option<EventDispatcher> {
        self.peers().get(identity_id).cloned()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<String, EventDispatcher>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One identity's connection to an [`InProcessRelay`]. Dropping it disconnects.
#[derive(Debug)]
pub struct RelayConnection {
    relay: InProcessRelay,
    identity_id: String,
    dispatcher: EventDispatcher,
}

impl RelayConnection {
    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    fn recipient_of<'a>(
        &self,
        sender_id: &str,
        key: &'a ConversationKey,
    ) -> Result<Option<&'a str>, TransportError> {
        if sender_id != self.identity_id {
            return Err(TransportError::Rejected {
                reason: format!("connection belongs to {}", self.identity_id),
            });
        }

        match key.peer_of(sender_id) {
            Some(peer) if peer == sender_id => Ok(None),
            Some(peer) => Ok(Some(peer)),
            None => Err(TransportError::Rejected {
                reason: "sender is not a participant of the conversation".to_owned(),
            }),
        }
    }
}

impl Transport for RelayConnection {
    fn send(&self, message: &Message) -> Result<DeliveryReceipt, TransportError> {
        let Some(peer) = self.recipient_of(&message.sender_id, &message.conversation_key)? else {
            return Ok(DeliveryReceipt::Accepted);
        };

        match self.relay.route(peer) {
            Some(dispatcher) => {
                let report = dispatcher.dispatch(&InboundEvent::Message(message.clone()));
                tracing::debug!(
                    message_id = %message.id,
                    peer,
                    delivered = report.delivered,
                    "message relayed to live peer"
                );
                Ok(DeliveryReceipt::Delivered)
            }
            None => Ok(DeliveryReceipt::Accepted),
        }
    }

    fn signal_typing(&self, signal: &TypingSignal) -> Result<(), TransportError> {
        let Some(peer) = self.recipient_of(&signal.sender_id, &signal.conversation_key)? else {
            return Ok(());
        };

        if let Some(dispatcher) = self.relay.route(peer) {
            dispatcher.dispatch(&InboundEvent::typing(signal.clone()));
        }
        Ok(())
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        let mut peers = self.relay.peers();
        let owned = peers
            .get(&self.identity_id)
            .is_some_and(|current| current.same_as(&self.dispatcher));
        if owned {
            peers.remove(&self.identity_id);
            tracing::debug!(identity = %self.identity_id, "relay connection closed");
        }
    }
}
