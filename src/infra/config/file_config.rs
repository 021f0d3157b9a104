use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{
    AppConfig, DirectoryConfig, HistoryConfig, LogConfig, StorageConfig, TypingConfig, UserEntry,
};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub storage: Option<FileStorageConfig>,
    pub typing: Option<FileTypingConfig>,
    pub history: Option<FileHistoryConfig>,
    pub directory: Option<FileDirectoryConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(storage) = self.storage {
            storage.merge_into(&mut config.storage);
        }

        if let Some(typing) = self.typing {
            typing.merge_into(&mut config.typing);
        }

        if let Some(history) = self.history {
            history.merge_into(&mut config.history);
        }

        if let Some(directory) = self.directory {
            directory.merge_into(&mut config.directory);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if self.file.is_some() {
            config.file = self.file;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileStorageConfig {
    pub journal_dir: Option<PathBuf>,
}

impl FileStorageConfig {
    fn merge_into(self, config: &mut StorageConfig) {
        if self.journal_dir.is_some() {
            config.journal_dir = self.journal_dir;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileTypingConfig {
    pub expiry_ms: Option<u64>,
}

impl FileTypingConfig {
    fn merge_into(self, config: &mut TypingConfig) {
        if let Some(expiry_ms) = self.expiry_ms {
            config.expiry_ms = expiry_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileHistoryConfig {
    pub page_size: Option<usize>,
}

impl FileHistoryConfig {
    fn merge_into(self, config: &mut HistoryConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDirectoryConfig {
    pub users: Option<Vec<UserEntry>>,
}

impl FileDirectoryConfig {
    fn merge_into(self, config: &mut DirectoryConfig) {
        if let Some(users) = self.users {
            config.users = users;
        }
    }
}
