//! Conversation service: the session-scoped entry point a UI drives.
//!
//! Every operation resolves the current identity from the session registry
//! and checks that it participates in the conversation it touches.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    domain::{conversation::ConversationKey, identity::Identity},
    messaging::{
        dispatcher::{ConversationListener, EventDispatcher, Subscription},
        error::{ChatError, ChatResult},
        presence::TypingChannel,
        session::SessionRegistry,
        store::MessageStore,
        transport::Transport,
    },
};

pub(super) const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct ConversationService {
    pub(super) session: SessionRegistry,
    pub(super) store: Arc<dyn MessageStore>,
    pub(super) dispatcher: EventDispatcher,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) typing: TypingChannel,
    pub(super) page_size: usize,
}

impl ConversationService {
    pub fn new(
        session: SessionRegistry,
        store: Arc<dyn MessageStore>,
        dispatcher: EventDispatcher,
        transport: Arc<dyn Transport>,
        typing: TypingChannel,
    ) -> Self {
        Self {
            session,
            store,
            dispatcher,
            transport,
            typing,
            page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }

    /// History page size used when a query leaves the limit at zero.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn login(&self, id: &str) -> ChatResult<Identity> {
        self.session.login(id)
    }

    /// Ends every typing indicator of the current identity, then clears the session.
    pub fn logout(&self) {
        if let Some(identity) = self.session.current() {
            let ended = self.typing.end_sender(&identity.id);
            tracing::debug!(identity = %identity.id, ended, "typing cleared on logout");
        }
        self.session.logout();
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.current()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn conversation_with(&self, peer_id: &str) -> ChatResult<ConversationKey> {
        let me = self.session.require_current()?;
        let peer = self.session.directory().get_identity(peer_id)?;

        Ok(ConversationKey::between(me.id, peer.id))
    }

    pub fn start_typing(&self, key: &ConversationKey) -> ChatResult<()> {
        let me = self.authorize(key)?;
        self.typing.start_typing(&me.id, key);
        Ok(())
    }

    /// Returns whether a typing indicator was actually active.
    pub fn end_typing(&self, key: &ConversationKey) -> ChatResult<bool> {
        let me = self.authorize(key)?;
        Ok(self.typing.end_typing(&me.id, key))
    }

    /// Deletes the whole conversation and clears typing state on both sides.
    pub fn delete_conversation(&self, key: &ConversationKey) -> ChatResult<usize> {
        self.authorize(key)?;

        let removed = self.store.delete_conversation(key)?;
        let typing_ended = self.typing.end_conversation(key);
        self.dispatcher.reset_typing(key);

        tracing::info!(conversation = %key, removed, typing_ended, "conversation deleted");
        Ok(removed)
    }

    /// Subscribes `listener` to the conversation as the current identity.
    pub fn open(
        &self,
        key: &ConversationKey,
        listener: Arc<dyn ConversationListener>,
    ) -> ChatResult<ConversationView> {
        let me = self.authorize(key)?;
        let subscription = self.dispatcher.subscribe(key, &me.id, listener);

        Ok(ConversationView {
            subscription,
            typing: self.typing.clone(),
            identity_id: me.id,
            closed: AtomicBool::new(false),
        })
    }

    pub(super) fn authorize(&self, key: &ConversationKey) -> ChatResult<Identity> {
        let me = self.session.require_current()?;
        if !key.involves(&me.id) {
            return Err(ChatError::Unauthorized {
                reason: "identity is not a participant of the conversation",
            });
        }

        Ok(me)
    }
}

impl std::fmt::Debug for ConversationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationService")
            .field("session", &self.session)
            .field("dispatcher", &self.dispatcher)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// An open conversation screen. Closing it (or dropping it) unsubscribes the
/// listener and sends a final typing `Ended`.
pub struct ConversationView {
    subscription: Subscription,
    typing: TypingChannel,
    identity_id: String,
    closed: AtomicBool,
}

impl ConversationView {
    pub fn listener_id(&self) -> &str {
        self.subscription.listener_id()
    }

    pub fn conversation_key(&self) -> &ConversationKey {
        self.subscription.conversation_key()
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.subscription.unsubscribe();
        self.typing
            .release(&self.identity_id, self.subscription.conversation_key());
        tracing::debug!(listener_id = self.listener_id(), "conversation view closed");
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConversationView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationView")
            .field("listener_id", &self.listener_id())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{sync::Mutex, time::Duration};

    use super::*;
    use crate::{
        domain::{
            identity::Identity,
            message::Message,
            typing::{TypingSignal, TypingState},
        },
        messaging::{
            directory::MemoryDirectory,
            store::MemoryMessageStore,
            transport::{DeliveryReceipt, TransportError},
        },
    };

    /// Transport double that records traffic and answers sends with a fixed outcome.
    pub(crate) struct RecordingTransport {
        pub(crate) outcome: Mutex<Result<DeliveryReceipt, TransportError>>,
        pub(crate) sent: Mutex<Vec<Message>>,
        pub(crate) signals: Mutex<Vec<TypingSignal>>,
    }

    impl RecordingTransport {
        pub(crate) fn answering(outcome: Result<DeliveryReceipt, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(outcome),
                sent: Mutex::new(Vec::new()),
                signals: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn set_outcome(&self, outcome: Result<DeliveryReceipt, TransportError>) {
            *self.outcome.lock().expect("outcome lock") = outcome;
        }

        pub(crate) fn typing_states(&self) -> Vec<TypingState> {
            self.signals
                .lock()
                .expect("signals lock")
                .iter()
                .map(|signal| signal.state)
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, message: &Message) -> Result<DeliveryReceipt, TransportError> {
            self.sent.lock().expect("sent lock").push(message.clone());
            self.outcome.lock().expect("outcome lock").clone()
        }

        fn signal_typing(&self, signal: &TypingSignal) -> Result<(), TransportError> {
            self.signals.lock().expect("signals lock").push(signal.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct CapturingListener {
        pub(crate) messages: Mutex<Vec<Message>>,
    }

    impl ConversationListener for CapturingListener {
        fn on_message(&self, message: &Message) -> anyhow::Result<()> {
            self.messages.lock().expect("messages lock").push(message.clone());
            Ok(())
        }
    }

    pub(crate) fn service_with(transport: Arc<RecordingTransport>) -> ConversationService {
        let directory = Arc::new(MemoryDirectory::with_users([
            Identity::new("alice", "Alice"),
            Identity::new("bob", "Bob"),
            Identity::new("carol", "Carol"),
        ]));
        let session = SessionRegistry::new(directory);
        let typing = TypingChannel::new(transport.clone(), Duration::from_secs(5));

        ConversationService::new(
            session,
            Arc::new(MemoryMessageStore::new()),
            EventDispatcher::new(),
            transport,
            typing,
        )
    }

    pub(crate) fn logged_in_service(transport: Arc<RecordingTransport>) -> ConversationService {
        let service = service_with(transport);
        service.login("alice").expect("alice should log in");
        service
    }

    #[test]
    fn operations_require_a_session() {
        let service = service_with(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let err = service
            .conversation_with("bob")
            .expect_err("must require login");

        assert!(matches!(err, ChatError::Unauthorized { .. }));
    }

    #[test]
    fn conversation_with_unknown_peer_is_not_found() {
        let service =
            logged_in_service(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let err = service
            .conversation_with("mallory")
            .expect_err("unknown peer must fail");

        assert!(matches!(err, ChatError::NotFound { entity: "identity", .. }));
    }

    #[test]
    fn conversation_with_builds_canonical_key() {
        let service =
            logged_in_service(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let key = service.conversation_with("bob").expect("bob exists");

        assert_eq!(key, ConversationKey::between("bob", "alice"));
    }

    #[test]
    fn rejects_conversations_the_identity_is_not_part_of() {
        let service =
            logged_in_service(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));
        let foreign = ConversationKey::between("bob", "carol");

        let err = service
            .start_typing(&foreign)
            .expect_err("non participant must be rejected");

        assert!(matches!(err, ChatError::Unauthorized { .. }));
    }

    #[test]
    fn end_typing_reports_whether_indicator_was_active() {
        let transport = RecordingTransport::answering(Ok(DeliveryReceipt::Accepted));
        let service = logged_in_service(transport.clone());
        let key = ConversationKey::between("alice", "bob");

        service.start_typing(&key).expect("start typing");
        let first = service.end_typing(&key).expect("end typing");
        let second = service.end_typing(&key).expect("end typing again");

        assert!(first);
        assert!(!second);
        assert_eq!(
            transport.typing_states(),
            [TypingState::Started, TypingState::Ended]
        );
    }

    #[test]
    fn view_teardown_unsubscribes_and_releases_typing_once() {
        let transport = RecordingTransport::answering(Ok(DeliveryReceipt::Accepted));
        let service = logged_in_service(transport.clone());
        let key = ConversationKey::between("alice", "bob");

        let view = service
            .open(&key, Arc::new(CapturingListener::default()))
            .expect("open view");
        assert_eq!(view.listener_id(), "listener_alice_bob");
        assert_eq!(service.dispatcher().listener_count(), 1);

        view.close();
        view.close();
        drop(view);

        assert_eq!(service.dispatcher().listener_count(), 0);
        assert_eq!(transport.typing_states(), [TypingState::Ended]);
    }

    #[test]
    fn delete_conversation_clears_store_and_typing() {
        let transport = RecordingTransport::answering(Ok(DeliveryReceipt::Accepted));
        let service = logged_in_service(transport.clone());
        let key = ConversationKey::between("alice", "bob");
        service.send(&key, "one").expect("send");
        service.send(&key, "two").expect("send");
        service.start_typing(&key).expect("start typing");

        let removed = service.delete_conversation(&key).expect("delete");
        let page = service
            .load_history(&key, Default::default())
            .expect("history");

        assert_eq!(removed, 2);
        assert!(page.is_empty());
        assert_eq!(
            transport.typing_states().last(),
            Some(&TypingState::Ended)
        );
    }

    #[test]
    fn logout_ends_typing_and_clears_session() {
        let transport = RecordingTransport::answering(Ok(DeliveryReceipt::Accepted));
        let service = logged_in_service(transport.clone());
        let bob = ConversationKey::between("alice", "bob");
        let carol = ConversationKey::between("alice", "carol");
        service.start_typing(&bob).expect("typing to bob");
        service.start_typing(&carol).expect("typing to carol");

        service.logout();

        assert!(service.current_identity().is_none());
        assert_eq!(
            transport.typing_states(),
            [
                TypingState::Started,
                TypingState::Started,
                TypingState::Ended,
                TypingState::Ended
            ]
        );
    }
}
