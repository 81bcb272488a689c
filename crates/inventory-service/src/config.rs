//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (`config.json` in the platform config dir, or `INVENTORY_CONFIG`)
//! 3. Environment variables (`INVENTORY_*` prefix)
//!
//! Environment variables take precedence over config file values.

use crate::{Error, Result};
use directories::ProjectDirs;
use inventory_storage_sqlite::DEFAULT_MASTER_KEY_ALIAS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "INVENTORY";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for the item database, preferences and sealed key
    pub data_dir: PathBuf,
    /// Directory for intermediate export files
    pub cache_dir: PathBuf,
    /// Item database file name inside `data_dir`
    pub database_file: String,
    /// Preferences file name inside `data_dir`
    pub preferences_file: String,
    /// Alias the master key is sealed under
    pub master_key_alias: String,
    /// Open the item database through SQLCipher
    pub encrypt_database: bool,
    /// How long an item subscription outlives its last observer
    pub subscription_linger_ms: u64,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let dirs = project_dirs();
        Self {
            data_dir: dirs
                .as_ref()
                .map(|d| d.data_local_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".inventory")),
            cache_dir: dirs
                .as_ref()
                .map(|d| d.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".inventory").join("cache")),
            database_file: "stock.db".to_string(),
            preferences_file: "inventory_prefs.json".to_string(),
            master_key_alias: DEFAULT_MASTER_KEY_ALIAS.to_string(),
            encrypt_database: true,
            subscription_linger_ms: 5_000,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Configuration rooted in one directory (tests and portable installs)
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            ..Self::default()
        }
    }

    /// Load configuration from the default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("failed to read {}: {}", path.display(), e))
            })?;
            Self::from_json(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Apply `INVENTORY_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", ENV_PREFIX, suffix));

        if let Some(val) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Some(val) = var("CACHE_DIR") {
            self.cache_dir = PathBuf::from(val);
        }
        if let Some(val) = var("ENCRYPT_DATABASE") {
            self.encrypt_database = !(val == "0" || val.eq_ignore_ascii_case("false"));
        }
        if let Some(val) = var("LOG") {
            self.log_filter = val;
        }
    }

    /// Get the config file path
    ///
    /// Can be overridden with the `INVENTORY_CONFIG` environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        project_dirs()
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    /// Create the data and cache directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.cache_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Path of the item database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Path of the preferences file
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(&self.preferences_file)
    }

    /// Directory for the intermediate files of item exports
    pub fn export_temp_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Subscription linger as a [`Duration`]
    pub fn subscription_linger(&self) -> Duration {
        Duration::from_millis(self.subscription_linger_ms)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "example", "inventory")
}
