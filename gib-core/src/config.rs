//! Store configuration
//!
//! Stored at `{store}/config.json`. Every core operation receives the config
//! explicitly; there is no global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::storage::{Result, StorageError};

pub const CONFIG_FILE: &str = "config.json";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ref namespace: snapshots live under `refs/<namespace>/`
    pub namespace: String,
    /// File name used to keep otherwise empty directories in a tree
    pub marker_name: String,
    /// zstd level for loose objects
    pub compression_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "gib".to_string(),
            marker_name: ".gibkeep".to_string(),
            compression_level: 3,
        }
    }
}

impl Config {
    /// Load the config of the store at `root`
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        let data = fs::read_to_string(&config_path)?;
        serde_json::from_str(&data).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {:?}: {}", config_path, e))
        })
    }

    /// Save config into the store at `root`
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_path = root.join(CONFIG_FILE);
        let tmp_path = config_path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &config_path)?;
        Ok(())
    }
}
