use std::sync::{PoisonError, RwLock};

use crate::domain::identity::Identity;

use super::error::{ChatError, ChatResult};

/// Identity provider the core consumes to resolve and list users.
pub trait Directory: Send + Sync {
    fn list_users(&self, limit: usize) -> ChatResult<Vec<Identity>>;
    fn get_identity(&self, id: &str) -> ChatResult<Identity>;
}

/// Directory kept in process memory, in provisioning order.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<Vec<Identity>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = Identity>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.provision(user);
        }
        directory
    }

    /// Adds an identity. Existing ids are never overwritten; returns whether it was added.
    pub fn provision(&self, identity: Identity) -> bool {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if identity.id.trim().is_empty() || users.iter().any(|user| user.id == identity.id) {
            tracing::debug!(id = %identity.id, "identity provisioning skipped");
            return false;
        }

        users.push(identity);
        true
    }
}

impl Directory for MemoryDirectory {
    fn list_users(&self, limit: usize) -> ChatResult<Vec<Identity>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.iter().take(limit).cloned().collect())
    }

    fn get_identity(&self, id: &str) -> ChatResult<Identity> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("identity", id))
    }
}
