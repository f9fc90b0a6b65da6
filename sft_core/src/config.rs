use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::transfer::constants::TRANSFER_PORT;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "sft";
const APP_NAME: &str = "sft_core";
const CONFIG_FILE: &str = "config.json";

/// Runtime configuration for the transfer server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Address the server listens on
    pub listen_addr: String,
    /// Directory backing the file store
    pub storage_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let storage_dir = directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sft_uploads");

        Self {
            listen_addr: format!("127.0.0.1:{}", TRANSFER_PORT),
            storage_dir,
        }
    }
}

impl TransferConfig {
    /// Config file path; `SFT_TEST_CONFIG_DIR` overrides the platform
    /// directory so tests stay isolated
    fn config_path() -> Option<PathBuf> {
        if let Ok(test_path) = std::env::var("SFT_TEST_CONFIG_DIR") {
            return Some(PathBuf::from(test_path).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return the default
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk, best effort
    pub fn save(&self) {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return,
        };

        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, json);
        }
    }
}
