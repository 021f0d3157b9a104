use std::{
    collections::HashMap,
    sync::{mpsc::Sender, Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    domain::{
        conversation::ConversationKey,
        typing::{TypingSignal, TypingState},
    },
    messaging::transport::Transport,
};

use super::expiry::ExpiryCommand;

/// Inactivity window after which a typing sender is ended automatically.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_millis(5_000);

const TYPING_SIGNAL_SEND_FAILED: &str = "TYPING_SIGNAL_SEND_FAILED";

type TypingPair = (String, ConversationKey);

/// Outbound typing indicator with debounce expiry, keyed by sender and conversation.
///
/// Every `start_typing` re-issues `Started` and pushes the pair's deadline
/// out by the expiry window. Signals are stamped while the state lock is held,
/// so a concurrent expiry can never emit an `Ended` newer than a later
/// `Started` for the same pair. Transport failures are logged and dropped.
#[derive(Clone)]
pub struct TypingChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    transport: Arc<dyn Transport>,
    window: Duration,
    deadlines: Mutex<HashMap<TypingPair, Instant>>,
    waker: Mutex<Option<Sender<ExpiryCommand>>>,
}

impl TypingChannel {
    pub fn new(transport: Arc<dyn Transport>, window: Duration) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                window,
                deadlines: Mutex::new(HashMap::new()),
                waker: Mutex::new(None),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    pub fn start_typing(&self, sender_id: &str, key: &ConversationKey) {
        self.start_typing_at(sender_id, key, Instant::now());
    }

    pub fn start_typing_at(&self, sender_id: &str, key: &ConversationKey, now: Instant) {
        let (signal, refreshed) = {
            let mut deadlines = self.deadlines();
            let refreshed = deadlines
                .insert((sender_id.to_owned(), key.clone()), now + self.inner.window)
                .is_some();
            (
                TypingSignal::now(key.clone(), sender_id, TypingState::Started),
                refreshed,
            )
        };

        tracing::trace!(conversation = %key, sender = sender_id, refreshed, "typing started");
        self.emit(&signal);
        self.wake();
    }

    /// Explicit `Typing -> Idle`; returns whether the pair was typing.
    pub fn end_typing(&self, sender_id: &str, key: &ConversationKey) -> bool {
        let signal = {
            let mut deadlines = self.deadlines();
            deadlines
                .remove(&(sender_id.to_owned(), key.clone()))
                .map(|_| TypingSignal::now(key.clone(), sender_id, TypingState::Ended))
        };

        match signal {
            Some(signal) => {
                self.emit(&signal);
                true
            }
            None => false,
        }
    }

    /// Teardown form of `end_typing`: cancels any deadline and always emits `Ended`.
    pub fn release(&self, sender_id: &str, key: &ConversationKey) {
        let signal = {
            let mut deadlines = self.deadlines();
            deadlines.remove(&(sender_id.to_owned(), key.clone()));
            TypingSignal::now(key.clone(), sender_id, TypingState::Ended)
        };
        self.emit(&signal);
    }

    /// Ends every typing pair of a conversation.
    pub fn end_conversation(&self, key: &ConversationKey) -> usize {
        self.end_matching(|(_, pair_key)| pair_key == key)
    }

    /// Ends every typing pair of a sender.
    pub fn end_sender(&self, sender_id: &str) -> usize {
        self.end_matching(|(pair_sender, _)| pair_sender == sender_id)
    }

    /// Ends every pair whose deadline is at or before `now`.
    pub fn expire_due(&self, now: Instant) -> usize {
        let expired = self.take_matching(|_, deadline| *deadline <= now);
        for signal in &expired {
            tracing::debug!(
                conversation = %signal.conversation_key,
                sender = %signal.sender_id,
                "typing expired after inactivity"
            );
            self.emit(signal);
        }
        expired.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines().values().min().copied()
    }

    pub fn is_typing(&self, sender_id: &str, key: &ConversationKey) -> bool {
        self.deadlines()
            .contains_key(&(sender_id.to_owned(), key.clone()))
    }

    pub(super) fn attach_waker(&self, waker: Option<Sender<ExpiryCommand>>) {
        *self
            .inner
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = waker;
    }

    fn end_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&TypingPair) -> bool,
    {
        let ended = self.take_matching(|pair, _| predicate(pair));
        for signal in &ended {
            self.emit(signal);
        }
        ended.len()
    }

    fn take_matching<F>(&self, predicate: F) -> Vec<TypingSignal>
    where
        F: Fn(&TypingPair, &Instant) -> bool,
    {
        let mut deadlines = self.deadlines();
        let pairs: Vec<TypingPair> = deadlines
            .iter()
            .filter(|(pair, deadline)| predicate(pair, deadline))
            .map(|(pair, _)| pair.clone())
            .collect();

        pairs
            .into_iter()
            .filter_map(|pair| {
                deadlines.remove(&pair)?;
                let (sender_id, key) = pair;
                Some(TypingSignal::now(key, &sender_id, TypingState::Ended))
            })
            .collect()
    }

    fn emit(&self, signal: &TypingSignal) {
        if let Err(error) = self.inner.transport.signal_typing(signal) {
            tracing::warn!(
                code = TYPING_SIGNAL_SEND_FAILED,
                conversation = %signal.conversation_key,
                state = ?signal.state,
                error = %error,
                "typing signal dropped"
            );
        }
    }

    fn wake(&self) {
        let waker = self
            .inner
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(waker) = waker.as_ref() {
            let _ = waker.send(ExpiryCommand::Wake);
        }
    }

    fn deadlines(&self) -> MutexGuard<'_, HashMap<TypingPair, Instant>> {
        self.inner
            .deadlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TypingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingChannel")
            .field("window", &self.inner.window)
            .field("active", &self.deadlines().len())
            .finish()
    }
}
