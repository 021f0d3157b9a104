use std::{env, fs, path::PathBuf};

use crate::infra::error::AppError;

const APP_DIR_NAME: &str = "parley";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub data_dir: PathBuf,
    pub journal_dir: PathBuf,
}

impl StorageLayout {
    /// Resolves `$XDG_DATA_HOME/parley`, falling back to the platform data directory.
    pub fn resolve() -> Result<Self, AppError> {
        let data_base = env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .filter(|path| path.is_absolute())
            .or_else(dirs::data_dir)
            .ok_or_else(|| AppError::StoragePathResolution {
                details: "unable to resolve data base directory (XDG_DATA_HOME/HOME)".into(),
            })?;

        Ok(Self::under(data_base.join(APP_DIR_NAME)))
    }

    pub fn under(data_dir: PathBuf) -> Self {
        let journal_dir = data_dir.join("journal");
        Self {
            data_dir,
            journal_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [&self.data_dir, &self.journal_dir] {
            fs::create_dir_all(dir).map_err(|source| AppError::StorageDirCreate {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(())
    }
}
