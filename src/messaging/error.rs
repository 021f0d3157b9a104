use std::path::PathBuf;

use thiserror::Error;

use crate::domain::message::{Message, TextViolation};

use super::transport::TransportError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },
    #[error("message {} could not be sent: {source}", .message.id)]
    SendFailed {
        message: Box<Message>,
        #[source]
        source: TransportError,
    },
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: &'static str },
    #[error("message journal I/O failed at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("message journal {path} has a corrupt entry on line {line}: {source}")]
    JournalDecode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("message journal at {path} is locked by another process")]
    StoreLocked { path: PathBuf },
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable label for logs and user-facing status lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "CHAT_NOT_FOUND",
            Self::InvalidMessage { .. } => "CHAT_INVALID_MESSAGE",
            Self::SendFailed { .. } => "CHAT_SEND_FAILED",
            Self::Unauthorized { .. } => "CHAT_UNAUTHORIZED",
            Self::Storage { .. } | Self::JournalDecode { .. } | Self::StoreLocked { .. } => {
                "CHAT_STORAGE_FAILED"
            }
        }
    }
}

impl From<TextViolation> for ChatError {
    fn from(violation: TextViolation) -> Self {
        Self::InvalidMessage {
            reason: violation.to_string(),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
