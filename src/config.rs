//! Configuration management for driftwatch
//!
//! Stores settings in ~/.config/driftwatch/config.json

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classify::default_done_statuses;
use crate::metrics::{MetricsConfig, DEFAULT_STALE_THRESHOLD_DAYS};

fn default_limit() -> usize {
    100
}

fn default_stale_threshold_days() -> i64 {
    DEFAULT_STALE_THRESHOLD_DAYS
}

fn default_status_date_fields() -> HashMap<String, String> {
    MetricsConfig::default().status_date_fields
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Board statuses considered terminal.
    #[serde(default = "default_done_statuses")]
    pub done_statuses: Vec<String>,
    /// Days an item may sit "In Progress" before it counts as stale.
    #[serde(default = "default_stale_threshold_days")]
    pub stale_threshold_days: i64,
    /// Board status -> name of the free-text timestamp field paired with it.
    #[serde(default = "default_status_date_fields")]
    pub status_date_fields: HashMap<String, String>,
    /// Default cap on work items fetched per run.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            done_statuses: default_done_statuses(),
            stale_threshold_days: default_stale_threshold_days(),
            status_date_fields: default_status_date_fields(),
            limit: default_limit(),
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("driftwatch"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return defaults. A corrupt file is moved
    /// aside so the next save does not silently clobber user edits.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        tracing::warn!(
                            "config file was corrupted ({}); a backup was saved and defaults were loaded",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &content).map_err(|e| format!("Failed to write config: {}", e))?;
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(format!("Failed to write config: {}", err));
        }
        Ok(())
    }

    /// The metrics classifier's view of this configuration.
    pub fn metrics(&self) -> MetricsConfig {
        MetricsConfig {
            status_date_fields: self.status_date_fields.clone(),
            stale_threshold_days: self.stale_threshold_days,
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/driftwatch/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
