/// Application configuration
///
/// Stored as JSON in the data directory:
/// - Linux: ~/.local/share/farm-tracker/farm-tracker.json
/// - macOS: ~/Library/Application Support/farm-tracker/farm-tracker.json
/// - Windows: %APPDATA%\farm-tracker\farm-tracker.json
///
/// `FARM_TRACKER_DATA_DIR` overrides the data directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "farm-tracker.json";
const DATA_DIR_ENV: &str = "FARM_TRACKER_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Where the database and blobs live
    pub data_dir: PathBuf,

    /// Default log filter when RUST_LOG is not set
    pub log_level: String,

    /// Prefix of every durable image URL handed out by the blob store
    pub public_base_url: String,

    /// Key prefix for uploaded farm images
    pub image_namespace: String,

    /// Document collection holding farm records
    pub farms_collection: String,
}

/// Where a loaded configuration came from. Loading happens before logging
/// is set up, so the caller reports this once the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    CreatedDefault(PathBuf),
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::default_with_dir(data_dir)
    }
}

impl AppConfig {
    pub fn target_version() -> u32 {
        1
    }

    /// Load configuration from the default location
    pub fn load() -> Result<(Self, ConfigOrigin), ConfigError> {
        let data_dir = default_data_dir()?;
        Self::load_from(&data_dir)
    }

    /// Load configuration from a specific data directory, writing defaults if missing
    pub fn load_from(data_dir: &Path) -> Result<(Self, ConfigOrigin), ConfigError> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let json = fs::read_to_string(&config_path)?;
            let mut config: AppConfig = serde_json::from_str(&json)?;
            // The file may have been copied from another machine
            config.data_dir = data_dir.to_path_buf();
            Ok((config, ConfigOrigin::File(config_path)))
        } else {
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok((config, ConfigOrigin::CreatedDefault(config_path)))
        }
    }

    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::target_version(),
            data_dir,
            log_level: "info".to_string(),
            public_base_url: "https://storage.farm-tracker.local/".to_string(),
            image_namespace: "farms/".to_string(),
            farms_collection: "farms".to_string(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("farm_tracker.db")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

/// Data directory, honouring the environment override
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or(ConfigError::NoDataDir)?;

    path.push("farm-tracker");
    Ok(path)
}
