use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::identity::Identity;

use super::{
    directory::Directory,
    error::{ChatError, ChatResult},
};

/// Holds the identity logged in for this process.
#[derive(Clone)]
pub struct SessionRegistry {
    directory: Arc<dyn Directory>,
    current: Arc<Mutex<Option<Identity>>>,
}

impl SessionRegistry {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn login(&self, id: &str) -> ChatResult<Identity> {
        let identity = self.directory.get_identity(id)?;
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(identity.clone());

        tracing::info!(
            id = %identity.id,
            replaced = ?previous.map(|p| p.id),
            "session login"
        );
        Ok(identity)
    }

    pub fn logout(&self) {
        if let Some(identity) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tracing::info!(id = %identity.id, "session logout");
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn require_current(&self) -> ChatResult<Identity> {
        self.current().ok_or(ChatError::Unauthorized {
            reason: "no identity is logged in",
        })
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
