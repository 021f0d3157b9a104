use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::infra::{
    config::{file_config::FileConfig, AppConfig},
    error::AppError,
};

const DEFAULT_CONFIG_PATH: &str = "parley.toml";
const MAX_HISTORY_PAGE_SIZE: usize = 200;

pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = AppConfig::default();

    if !config_path.exists() {
        return Ok(config);
    }

    let raw = fs::read_to_string(&config_path).map_err(|source| AppError::ConfigRead {
        path: config_path.clone(),
        source,
    })?;

    let file_config: FileConfig = toml::from_str(&raw).map_err(|source| AppError::ConfigParse {
        path: config_path,
        source,
    })?;

    file_config.merge_into(&mut config);
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), AppError> {
    if config.typing.expiry_ms == 0 {
        return Err(AppError::ConfigInvalid {
            field: "typing.expiry_ms",
            details: "must be greater than zero".to_owned(),
        });
    }

    if !(1..=MAX_HISTORY_PAGE_SIZE).contains(&config.history.page_size) {
        return Err(AppError::ConfigInvalid {
            field: "history.page_size",
            details: format!("must be between 1 and {MAX_HISTORY_PAGE_SIZE}"),
        });
    }

    let mut seen = HashSet::new();
    for user in &config.directory.users {
        if user.id.trim().is_empty() || !seen.insert(user.id.as_str()) {
            return Err(AppError::ConfigInvalid {
                field: "directory.users",
                details: format!("user id '{}' is blank or duplicated", user.id),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(contents: &str) -> Result<AppConfig, AppError> {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("parley.toml");
        fs::write(&config_path, contents).expect("must write test config");
        load(Some(&config_path))
    }

    #[test]
    fn returns_defaults_when_file_is_missing() {
        let config = load(Some(Path::new("./missing-config.toml"))).expect("config must load");

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.typing.expiry_ms, 5_000);
        assert_eq!(config.history.page_size, 50);
    }

    #[test]
    fn merges_file_values_over_defaults() {
        let config = load_str(
            r#"[logging]
level = "debug"

[typing]
expiry_ms = 750

[[directory.users]]
id = "alice"
display_name = "Alice"

[[directory.users]]
id = "bob"
"#,
        )
        .expect("config must load");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, None);
        assert_eq!(config.typing.expiry_ms, 750);
        assert_eq!(config.history.page_size, 50);
        assert_eq!(config.directory.users.len(), 2);
        assert_eq!(config.directory.users[1].to_identity().display_name, "bob");
    }

    #[test]
    fn rejects_zero_typing_expiry() {
        let err = load_str("[typing]\nexpiry_ms = 0\n").expect_err("must fail");

        assert!(matches!(
            err,
            AppError::ConfigInvalid {
                field: "typing.expiry_ms",
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let err = load_str("[history]\npage_size = 500\n").expect_err("must fail");

        assert!(matches!(
            err,
            AppError::ConfigInvalid {
                field: "history.page_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_directory_ids() {
        let err = load_str(
            "[[directory.users]]\nid = \"alice\"\n\n[[directory.users]]\nid = \"alice\"\n",
        )
        .expect_err("must fail");

        assert!(matches!(
            err,
            AppError::ConfigInvalid {
                field: "directory.users",
                ..
            }
        ));
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let err = load_str("[typing\n").expect_err("must fail");

        assert!(matches!(err, AppError::ConfigParse { .. }));
    }
}
