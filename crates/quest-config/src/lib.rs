//! Configuration management for Quest
//!
//! Holds the database location, background persistence tuning, metadata
//! catalogue and logging settings. Files are TOML; environment variables
//! prefixed with `QUEST__` override file values when loading layered.

mod database_config;
mod sync_config;

pub use database_config::{DatabaseConfig, MetadataConfig};
pub use sync_config::SyncConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Layered configuration error: {0}")]
    Layered(#[from] config::ConfigError),
}

/// System-wide configuration directory
pub const CONFIG_DIR: &str = "/etc/quest";

/// Per-user configuration directory, relative to `$HOME`
pub const USER_CONFIG_DIR: &str = ".quest";

/// Configuration file name inside either directory
pub const CONFIG_FILE: &str = "config.toml";

/// Database file name inside the user directory
pub const DATABASE_FILE: &str = "quest.db";

/// Environment prefix for layered overrides (`QUEST__SYNC__PERSIST_TIMEOUT_MS`)
pub const ENV_PREFIX: &str = "QUEST";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Main Quest configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl QuestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file (if present) with `QUEST__*` environment overrides on top
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let layered = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = layered.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // Try user config first, then system config
        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                return Self::load_layered(&user_config);
            }
        }

        let system_config = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Self::load_layered(&system_config);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.persist_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.persist_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sync.notice_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sync.notice_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `$HOME/.quest`, when a home directory is known
pub fn user_data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(USER_CONFIG_DIR))
}

/// `$HOME/.quest/config.toml`, when a home directory is known
pub fn user_config_path() -> Option<PathBuf> {
    user_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = QuestConfig::default();
        assert_eq!(config.logging.filter, "info");
        assert!(config.sync.persist_timeout_ms > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[database]
path = "/tmp/backlog.db"

[sync]
persist_timeout_ms = 750

[logging]
filter = "quest_library=debug"
"#;
        write!(temp_file, "{}", config_content).unwrap();

        let config = QuestConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/backlog.db"));
        assert_eq!(config.sync.persist_timeout(), Duration::from_millis(750));
        assert_eq!(config.sync.notice_capacity, 64);
        assert_eq!(config.logging.filter, "quest_library=debug");
    }

    #[test]
    fn test_load_missing_file() {
        let err = QuestConfig::load(Path::new("/nonexistent/quest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[sync]\npersist_timeout_ms = 0\n").unwrap();

        let err = QuestConfig::load(temp_file.path()).unwrap_err();
        assert!(format!("{}", err).contains("persist_timeout_ms"));
    }

    #[test]
    fn test_layered_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\nnotice_capacity = 8\n").unwrap();

        let config = QuestConfig::load_layered(&path).unwrap();
        assert_eq!(config.sync.notice_capacity, 8);
        assert_eq!(config.database.path, DatabaseConfig::default().path);
    }

    #[test]
    fn test_layered_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = QuestConfig::load_layered(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sync.notice_capacity, 64);
    }

    #[test]
    fn test_save_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = QuestConfig::default();
        config.metadata.catalog_path = Some(PathBuf::from("catalog.json"));

        config.save(&path).unwrap();

        let loaded = QuestConfig::load(&path).unwrap();
        assert_eq!(loaded.metadata.catalog_path, Some(PathBuf::from("catalog.json")));
        assert_eq!(loaded.sync.persist_timeout_ms, config.sync.persist_timeout_ms);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound(PathBuf::from("/etc/quest/config.toml"));
        assert!(format!("{}", err).contains("not found"));

        let err = ConfigError::Invalid("test error".to_string());
        assert!(format!("{}", err).contains("Invalid"));
    }
}
