//! Fan-out of inbound transport events to per-conversation listeners.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use crate::domain::{
    conversation::ConversationKey, events::InboundEvent, message::Message, typing::TypingSignal,
};

use super::presence::RemoteTypingTracker;

const DISPATCH_LISTENER_FAILED: &str = "DISPATCH_LISTENER_FAILED";
const DISPATCH_LISTENER_REPLACED: &str = "DISPATCH_LISTENER_REPLACED";

/// Receiver of events for one conversation.
///
/// Errors and panics raised by a handler are contained: they are logged and
/// never keep other listeners from receiving the same event.
pub trait ConversationListener: Send + Sync {
    fn on_message(&self, message: &Message) -> anyhow::Result<()>;

    fn on_typing_started(&self, _signal: &TypingSignal) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_typing_ended(&self, _signal: &TypingSignal) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Registrations whose conversation matched when dispatch began.
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Listener id for a subscriber watching a conversation: `listener_<subscriber>_<peer>`.
pub fn listener_id(subscriber_id: &str, key: &ConversationKey) -> String {
    let peer = key.peer_of(subscriber_id).unwrap_or(subscriber_id);
    format!("listener_{subscriber_id}_{peer}")
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    registrations: Mutex<Vec<Arc<Registration>>>,
    typing: Mutex<RemoteTypingTracker>,
    /// Held from a typing transition being observed until it is delivered,
    /// so listeners see transitions in the order the tracker accepted them.
    typing_delivery: Mutex<()>,
}

impl DispatcherInner {
    fn registrations(&self) -> MutexGuard<'_, Vec<Arc<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn typing(&self) -> MutexGuard<'_, RemoteTypingTracker> {
        self.typing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn typing_delivery(&self) -> MutexGuard<'_, ()> {
        self.typing_delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Registration {
    listener_id: String,
    subscriber_id: String,
    key: ConversationKey,
    listener: Arc<dyn ConversationListener>,
    active: AtomicBool,
}

impl Registration {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `key`, replacing any registration the same
    /// subscriber already holds for that conversation.
    ///
    /// Peers already typing in the conversation are announced to the new
    /// listener with `on_typing_started` before this returns. Must not be
    /// called from inside a typing handler.
    pub fn subscribe(
        &self,
        key: &ConversationKey,
        subscriber_id: &str,
        listener: Arc<dyn ConversationListener>,
    ) -> Subscription {
        let registration = Arc::new(Registration {
            listener_id: listener_id(subscriber_id, key),
            subscriber_id: subscriber_id.to_owned(),
            key: key.clone(),
            listener,
            active: AtomicBool::new(true),
        });

        let _ordered = self.inner.typing_delivery();
        let mut registrations = self.inner.registrations();
        registrations.retain(|existing| {
            let replaced = existing.subscriber_id == subscriber_id && existing.key == *key;
            if replaced {
                existing.deactivate();
                tracing::debug!(
                    code = DISPATCH_LISTENER_REPLACED,
                    listener_id = %existing.listener_id,
                    "listener registration replaced"
                );
            }
            !replaced
        });
        registrations.push(Arc::clone(&registration));
        drop(registrations);

        tracing::debug!(listener_id = %registration.listener_id, "listener registered");

        let typing_now = self.inner.typing().typing_in(key);
        for signal in typing_now {
            let event = InboundEvent::TypingStarted(signal);
            if !is_own_typing(&event, &registration) {
                report_outcome(&registration, &event, deliver(&registration, &event));
            }
        }

        Subscription {
            dispatcher: Arc::downgrade(&self.inner),
            registration,
            released: AtomicBool::new(false),
        }
    }

    /// Delivers `event` to every listener of its conversation, in registration order.
    ///
    /// Typing events are delivered one at a time per dispatcher, in the order
    /// their transitions were accepted.
    pub fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        let _ordered = match event {
            InboundEvent::TypingStarted(signal) | InboundEvent::TypingEnded(signal) => {
                let ordered = self.inner.typing_delivery();
                if self.inner.typing().observe(signal).is_none() {
                    return DispatchReport::default();
                }
                Some(ordered)
            }
            InboundEvent::Message(_) => None,
        };

        let key = event.conversation_key();
        let targets: Vec<Arc<Registration>> = self
            .inner
            .registrations()
            .iter()
            .filter(|registration| registration.key == *key)
            .cloned()
            .collect();

        let mut report = DispatchReport {
            matched: targets.len(),
            ..DispatchReport::default()
        };

        for registration in targets {
            if !registration.is_active() || is_own_typing(event, &registration) {
                continue;
            }

            if report_outcome(&registration, event, deliver(&registration, event)) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::trace!(
            conversation = %key,
            event = event.kind(),
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "event dispatched"
        );
        report
    }

    /// Drops remote typing state for a conversation.
    pub fn reset_typing(&self, key: &ConversationKey) {
        self.inner.typing().forget(key);
    }

    pub fn is_peer_typing(&self, sender_id: &str, key: &ConversationKey) -> bool {
        self.inner.typing().is_typing(sender_id, key)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registrations().len()
    }

    pub fn same_as(&self, other: &EventDispatcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle to one registration. Dropping it unsubscribes.
pub struct Subscription {
    dispatcher: Weak<DispatcherInner>,
    registration: Arc<Registration>,
    released: AtomicBool,
}

impl Subscription {
    pub fn listener_id(&self) -> &str {
        &self.registration.listener_id
    }

    pub fn conversation_key(&self) -> &ConversationKey {
        &self.registration.key
    }

    /// Removes exactly this registration. Later calls are no-ops, and a
    /// registration that was already replaced leaves its replacement alone.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        self.registration.deactivate();
        if let Some(inner) = self.dispatcher.upgrade() {
            inner
                .registrations()
                .retain(|existing| !Arc::ptr_eq(existing, &self.registration));
        }

        tracing::debug!(listener_id = %self.registration.listener_id, "listener removed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listener_id", &self.registration.listener_id)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}

fn is_own_typing(event: &InboundEvent, registration: &Registration) -> bool {
    match event {
        InboundEvent::TypingStarted(signal) | InboundEvent::TypingEnded(signal) => {
            signal.sender_id == registration.subscriber_id
        }
        InboundEvent::Message(_) => false,
    }
}

fn deliver(registration: &Registration, event: &InboundEvent) -> Result<(), String> {
    let listener = registration.listener.as_ref();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
        InboundEvent::Message(message) => listener.on_message(message),
        InboundEvent::TypingStarted(signal) => listener.on_typing_started(signal),
        InboundEvent::TypingEnded(signal) => listener.on_typing_ended(signal),
    }));

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(payload) => Err(format!(
            "listener panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn report_outcome(
    registration: &Registration,
    event: &InboundEvent,
    outcome: Result<(), String>,
) -> bool {
    match outcome {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(
                code = DISPATCH_LISTENER_FAILED,
                listener_id = %registration.listener_id,
                event = event.kind(),
                reason = %reason,
                "listener failed to handle event"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic payload omitted".to_owned())
}
