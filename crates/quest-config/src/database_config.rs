//! Local store and metadata catalogue locations

use crate::{DATABASE_FILE, user_data_dir};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the tracked collection is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file, `~/.quest/quest.db` by default
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    // Without a home directory fall back to the working directory
    user_data_dir()
        .map(|dir| dir.join(DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Metadata lookup configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// JSON catalogue of game metadata used when adding games offline
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}
