// ⚙️ Configuration - photo-ledger.toml + environment overrides

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "photo-ledger.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub import: ImportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Label written into backups
    pub database: String,
    pub backup_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImportConfig {
    /// Section to extract; "All" for every section
    pub section: String,
    pub plan_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "photography.db".into(),
            database: "photography".into(),
            backup_dir: ".".into(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            section: "Requested".into(),
            plan_path: crate::handoff::DEFAULT_PLAN_FILE.into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl LedgerConfig {
    /// Load from a specific path (if it exists), then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            LedgerConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Logged by the caller once logging is up
    pub fn missing_config_notice(path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        (!path.exists()).then(|| format!("no config file at {}, using defaults", path.display()))
    }

    /// PHOTO_LEDGER_DB, PHOTO_LEDGER_SECTION, PHOTO_LEDGER_LOG_LEVEL
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PHOTO_LEDGER_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PHOTO_LEDGER_SECTION") {
            self.import.section = val;
        }
        if let Ok(val) = std::env::var("PHOTO_LEDGER_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.db_path)
    }

    pub fn plan_path(&self) -> PathBuf {
        PathBuf::from(&self.import.plan_path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.backup_dir)
    }
}
