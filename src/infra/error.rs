use std::path::PathBuf;

use thiserror::Error;

use crate::messaging::error::ChatError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {details}")]
    ConfigInvalid { field: &'static str, details: String },
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to resolve storage path: {details}")]
    StoragePathResolution { details: String },
    #[error("failed to create storage directory at {path}: {source}")]
    StorageDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("messaging core failed: {0}")]
    Chat(#[source] ChatError),
    #[error("typing expiry worker failed to start: {0}")]
    TypingWorker(#[source] crate::messaging::presence::ExpiryWorkerStartError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
