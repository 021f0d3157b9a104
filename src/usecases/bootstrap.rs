use std::{path::Path, sync::Arc};

use crate::{
    infra::{
        self,
        config::{AppConfig, FileConfigAdapter},
        contracts::ConfigAdapter,
        error::AppError,
        storage_layout::StorageLayout,
    },
    messaging::store::{JournalMessageStore, MessageStore},
    usecases::context::ChatContext,
};

pub fn bootstrap(config_path: Option<&Path>) -> Result<ChatContext, AppError> {
    let config = load_config(&FileConfigAdapter::new(config_path))?;
    let log_guard = infra::logging::init(&config.logging)?;
    let store = open_store(&config)?;

    let context = ChatContext::new(config, store).with_log_guard(log_guard);
    tracing::info!(
        users = context.config.directory.users.len(),
        "chat context ready"
    );
    Ok(context)
}

fn load_config(adapter: &dyn ConfigAdapter) -> Result<AppConfig, AppError> {
    adapter.load().map_err(AppError::Other)
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn MessageStore>, AppError> {
    let journal_dir = match &config.storage.journal_dir {
        Some(dir) => dir.clone(),
        None => {
            let layout = StorageLayout::resolve()?;
            layout.ensure_dirs()?;
            layout.journal_dir
        }
    };

    let store = JournalMessageStore::open(&journal_dir).map_err(AppError::Chat)?;
    tracing::debug!(journal_dir = %store.dir().display(), "message journal opened");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{infra::config::UserEntry, messaging::error::ChatError};

    struct StubConfigAdapter {
        config: AppConfig,
    }

    impl ConfigAdapter for StubConfigAdapter {
        fn load(&self) -> anyhow::Result<AppConfig> {
            Ok(self.config.clone())
        }
    }

    struct FailingConfigAdapter;

    impl ConfigAdapter for FailingConfigAdapter {
        fn load(&self) -> anyhow::Result<AppConfig> {
            anyhow::bail!("config source unavailable")
        }
    }

    #[test]
    fn loads_defaults_when_file_is_missing() {
        let config = load_config(&FileConfigAdapter::new(Some(Path::new(
            "./missing-config.toml",
        ))))
        .expect("config should load from defaults");

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn adapter_failures_surface_as_app_errors() {
        let err = load_config(&FailingConfigAdapter).expect_err("must fail");

        assert!(matches!(err, AppError::Other(_)));
    }

    #[test]
    fn opens_journal_from_configured_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = load_config(&StubConfigAdapter {
            config: AppConfig::default(),
        })
        .expect("stub config");
        config.storage.journal_dir = Some(dir.path().join("journal"));
        config.directory.users = vec![
            UserEntry {
                id: "alice".to_owned(),
                display_name: None,
            },
            UserEntry {
                id: "bob".to_owned(),
                display_name: None,
            },
        ];

        let store = open_store(&config).expect("journal opens");
        let context = ChatContext::new(config, store);
        let session = context.connect("alice").expect("alice connects");
        let key = session.service().conversation_with("bob").expect("key");
        session.service().send(&key, "persisted").expect("send");

        assert!(dir.path().join("journal").join(format!("{}.jsonl", key.file_stem())).exists());
    }

    #[test]
    fn second_store_on_same_journal_is_refused() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.storage.journal_dir = Some(dir.path().to_path_buf());

        let _first = open_store(&config).expect("first open");
        let err = open_store(&config)
            .err()
            .expect("second open must fail");

        assert!(matches!(err, AppError::Chat(ChatError::StoreLocked { .. })));
    }
}
