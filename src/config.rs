//! Configuration management for the consolidation engine.
//!
//! Settings are stored in TOML format with a strongly-typed structure,
//! validation and reasonable defaults. Two values drive consolidation
//! activation: the maximum-unspent-outputs threshold and the interval;
//! both must be nonzero for the scheduler to arm itself.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    #[serde(default)]
    pub split: SplitConfig,
}

/// Consolidation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Target maximum number of unspent outputs; 0 disables consolidation
    #[serde(default)]
    pub max_unspent_outputs: u32,

    /// Interval between drain ticks in seconds; 0 disables consolidation
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// One-time delay before the first drain after process start
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// Bound on back-to-back passes within one drain tick
    #[serde(default = "default_max_passes")]
    pub max_passes_per_tick: usize,

    /// Asset to consolidate (absent = base asset)
    #[serde(default)]
    pub asset: Option<String>,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_unspent_outputs: 0,
            interval_secs: default_interval_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            max_passes_per_tick: default_max_passes(),
            asset: None,
        }
    }
}

impl ConsolidationConfig {
    /// Whether the recurring schedule should arm at all.
    pub fn is_enabled(&self) -> bool {
        self.max_unspent_outputs > 0 && self.interval_secs > 0
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Output-splitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Whether periodic splitting runs at all
    #[serde(default)]
    pub enabled: bool,

    /// Number of chunks the largest output is split into
    #[serde(default = "default_chunk_count")]
    pub chunk_count: u32,

    /// Period between split checks in seconds
    #[serde(default = "default_split_period_secs")]
    pub period_secs: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_count: default_chunk_count(),
            period_secs: default_split_period_secs(),
        }
    }
}

impl SplitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.consolidation.max_passes_per_tick == 0 {
            return Err(anyhow!("Invalid max_passes_per_tick: must be greater than 0"));
        }

        // The threshold formula divides by chunk_count / 2.
        if self.split.chunk_count < 2 {
            return Err(anyhow!(
                "Invalid chunk_count: must be at least 2, got {}",
                self.split.chunk_count
            ));
        }

        if self.split.enabled && self.split.period_secs == 0 {
            return Err(anyhow!("Invalid split period: must be greater than 0"));
        }

        Ok(())
    }
}

/// Ensure a configuration file exists at the specified path
/// If it doesn't exist, create it with default values
pub fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        let default_config = Config::default();
        let content = toml::to_string_pretty(&default_config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write default config file: {}", e))?;
    }

    Ok(())
}

// Default value functions

fn default_interval_secs() -> u64 {
    3600
}

fn default_startup_delay_secs() -> u64 {
    300
}

fn default_max_passes() -> usize {
    100
}

fn default_chunk_count() -> u32 {
    10
}

fn default_split_period_secs() -> u64 {
    600
}
