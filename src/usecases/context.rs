use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    infra::{config::AppConfig, error::AppError},
    messaging::{
        directory::MemoryDirectory,
        dispatcher::EventDispatcher,
        presence::{TypingChannel, TypingExpiryWorker},
        session::SessionRegistry,
        store::MessageStore,
        transport::{InProcessRelay, RelayConnection},
    },
    usecases::conversation::ConversationService,
};

/// Process-wide wiring shared by every session.
pub struct ChatContext {
    pub config: AppConfig,
    pub directory: Arc<MemoryDirectory>,
    pub store: Arc<dyn MessageStore>,
    pub relay: InProcessRelay,
    log_guard: Option<WorkerGuard>,
}

impl ChatContext {
    pub fn new(config: AppConfig, store: Arc<dyn MessageStore>) -> Self {
        let directory = Arc::new(MemoryDirectory::with_users(
            config.directory.users.iter().map(|user| user.to_identity()),
        ));

        Self {
            config,
            directory,
            store,
            relay: InProcessRelay::new(),
            log_guard: None,
        }
    }

    /// Keeps the file log writer flushing for as long as the context lives.
    pub fn with_log_guard(mut self, guard: Option<WorkerGuard>) -> Self {
        self.log_guard = guard;
        self
    }

    /// Logs `identity_id` in and connects it to the relay with its own
    /// dispatcher, typing channel and expiry worker.
    pub fn connect(&self, identity_id: &str) -> Result<ChatSession, AppError> {
        let session = SessionRegistry::new(self.directory.clone());
        let identity = session.login(identity_id).map_err(AppError::Chat)?;

        let dispatcher = EventDispatcher::new();
        let connection = Arc::new(self.relay.connect(&identity.id, dispatcher.clone()));
        let typing = TypingChannel::new(connection.clone(), self.config.typing.expiry());
        let expiry = TypingExpiryWorker::start(typing.clone()).map_err(AppError::TypingWorker)?;

        let service = ConversationService::new(
            session,
            Arc::clone(&self.store),
            dispatcher,
            connection.clone(),
            typing,
        )
        .with_page_size(self.config.history.page_size);

        Ok(ChatSession {
            service,
            _expiry: expiry,
            _connection: connection,
        })
    }
}

impl std::fmt::Debug for ChatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatContext")
            .field("config", &self.config)
            .field("directory", &self.directory)
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

/// A logged-in identity. Dropping it logs out, stops the expiry worker and
/// disconnects from the relay.
#[derive(Debug)]
pub struct ChatSession {
    service: ConversationService,
    _expiry: TypingExpiryWorker,
    _connection: Arc<RelayConnection>,
}

impl ChatSession {
    pub fn service(&self) -> &ConversationService {
        &self.service
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.service.logout();
    }
}
