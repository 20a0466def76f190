//! Host configuration loaded from JSON

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::core::logging::DEFAULT_FILTER;
use crate::core::time::duration_from_secs;

/// Wait-token cache tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitCacheConfig {
    /// Entries unused for longer than this are evicted (seconds)
    pub unused_threshold_secs: f32,
    /// Delay between sweep passes (seconds)
    pub cleanup_interval_secs: f32,
}

impl Default for WaitCacheConfig {
    fn default() -> Self {
        Self {
            unused_threshold_secs: 60.0,
            cleanup_interval_secs: 60.0,
        }
    }
}

impl WaitCacheConfig {
    pub fn unused_threshold(&self) -> Duration {
        duration_from_secs(self.unused_threshold_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        duration_from_secs(self.cleanup_interval_secs)
    }

    /// Reject durations that cannot drive the sweep loop
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("unused_threshold_secs", self.unused_threshold_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a positive number of seconds, got {}",
                    field, value
                )));
            }
            Duration::try_from_secs_f32(value)
                .map_err(|e| Error::Config(format!("{} out of range: {}", field, e)))?;
        }
        Ok(())
    }
}

/// Top-level host configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Default log filter, overridden by RUST_LOG
    pub log_filter: String,
    /// Wait-token cache settings
    pub wait_cache: WaitCacheConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_FILTER.to_string(),
            wait_cache: WaitCacheConfig::default(),
        }
    }
}

impl HostConfig {
    /// Parse from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.wait_cache.validate()?;
        Ok(config)
    }

    /// Load from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }
}
