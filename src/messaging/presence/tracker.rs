use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    conversation::ConversationKey,
    typing::{TypingSignal, TypingState},
};

const TYPING_STALE_SIGNAL_DROPPED: &str = "TYPING_STALE_SIGNAL_DROPPED";

#[derive(Debug, Default, Clone, Copy)]
struct RemoteTyping {
    typing: bool,
    last_started: Option<DateTime<Utc>>,
    last_ended: Option<DateTime<Utc>>,
}

/// Typing state of remote senders as seen by one connection.
///
/// Collapses repeated `Started` signals into one transition and drops signals
/// that are older than the latest opposite signal from the same sender.
#[derive(Debug, Default)]
pub struct RemoteTypingTracker {
    peers: HashMap<(String, ConversationKey), RemoteTyping>,
}

impl RemoteTypingTracker {
    /// Returns the transition listeners should see, if any.
    pub fn observe(&mut self, signal: &TypingSignal) -> Option<TypingState> {
        let entry = self
            .peers
            .entry((signal.sender_id.clone(), signal.conversation_key.clone()))
            .or_default();

        match signal.state {
            TypingState::Started => {
                if entry.last_ended.is_some_and(|ended| signal.issued_at < ended) {
                    log_stale(signal);
                    return None;
                }

                entry.last_started = entry.last_started.max(Some(signal.issued_at));
                if entry.typing {
                    return None;
                }
                entry.typing = true;
                Some(TypingState::Started)
            }
            TypingState::Ended => {
                if entry
                    .last_started
                    .is_some_and(|started| signal.issued_at < started)
                {
                    log_stale(signal);
                    return None;
                }

                entry.last_ended = entry.last_ended.max(Some(signal.issued_at));
                if !entry.typing {
                    return None;
                }
                entry.typing = false;
                Some(TypingState::Ended)
            }
        }
    }

    pub fn is_typing(&self, sender_id: &str, key: &ConversationKey) -> bool {
        self.peers
            .get(&(sender_id.to_owned(), key.clone()))
            .is_some_and(|entry| entry.typing)
    }

    /// `Started` signals for every sender currently typing in `key`.
    pub fn typing_in(&self, key: &ConversationKey) -> Vec<TypingSignal> {
        self.peers
            .iter()
            .filter(|((_, peer_key), entry)| peer_key == key && entry.typing)
            .filter_map(|((sender_id, peer_key), entry)| {
                Some(TypingSignal {
                    conversation_key: peer_key.clone(),
                    sender_id: sender_id.clone(),
                    state: TypingState::Started,
                    issued_at: entry.last_started?,
                })
            })
            .collect()
    }

    pub fn forget(&mut self, key: &ConversationKey) {
        self.peers.retain(|(_, peer_key), _| peer_key != key);
    }
}

fn log_stale(signal: &TypingSignal) {
    tracing::debug!(
        code = TYPING_STALE_SIGNAL_DROPPED,
        conversation = %signal.conversation_key,
        sender = %signal.sender_id,
        state = ?signal.state,
        "stale typing signal dropped"
    );
}
