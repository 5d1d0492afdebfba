//! Bridge configuration
//!
//! TOML file with three tables: `[bridge]` for transport and sampling,
//! `[history]` for per-topic retention on the monitoring surface and
//! `[allow_list]` for the gate. Every field has a default, so a missing or
//! partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CHANNEL_CAPACITY, DEFAULT_IPC_HISTORY,
    DEFAULT_LOG_HISTORY, DEFAULT_PERFORMANCE_HISTORY, DEFAULT_SAMPLE_INTERVAL_SECS,
    SAMPLE_INTERVAL_MAX, SAMPLE_INTERVAL_MIN,
};
use crate::error::{BridgeError, Result};
use crate::gate::AllowList;
use crate::surface::HistoryLimits;

/// Main bridge configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfiguration {
    pub bridge: BridgeSettings,
    pub history: HistorySettings,
    pub allow_list: AllowListSettings,
}

/// Transport and sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSettings {
    /// Undelivered events buffered before the oldest is dropped (>= 1)
    pub channel_capacity: usize,
    /// Performance sampling interval in seconds (0.1-300.0)
    pub sample_interval_secs: f64,
    /// Renderer process to include in performance samples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer_pid: Option<u32>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            renderer_pid: None,
        }
    }
}

/// Events retained per topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistorySettings {
    pub log: usize,
    pub ipc_message: usize,
    pub performance_sample: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            log: DEFAULT_LOG_HISTORY,
            ipc_message: DEFAULT_IPC_HISTORY,
            performance_sample: DEFAULT_PERFORMANCE_HISTORY,
        }
    }
}

/// Channels an untrusted context may use; exact names or glob patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllowListSettings {
    pub send: Vec<String>,
    pub request: Vec<String>,
}

impl BridgeConfiguration {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/devbridge/config.toml`, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        let interval = self.bridge.sample_interval_secs;
        if !(SAMPLE_INTERVAL_MIN..=SAMPLE_INTERVAL_MAX).contains(&interval) {
            return Err(BridgeError::InvalidConfig(format!(
                "sample_interval_secs must be between {} and {} seconds, got {}",
                SAMPLE_INTERVAL_MIN, SAMPLE_INTERVAL_MAX, interval
            )));
        }
        if self.bridge.channel_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        // Surface glob errors at load time rather than first use
        self.allow_list()?;
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.bridge.sample_interval_secs)
    }

    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            log: self.history.log,
            ipc_message: self.history.ipc_message,
            performance_sample: self.history.performance_sample,
        }
    }

    pub fn allow_list(&self) -> Result<AllowList> {
        AllowList::new(&self.allow_list.send[..], &self.allow_list.request[..])
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::InvalidConfig(e.to_string()))
    }
}
