//! Engine configuration
//!
//! All tunables of the decode pipeline, history store, delayed player and
//! read loop. Every field has a default, so a YAML file only needs to list
//! the values it changes:
//!
//! ```rust
//! use bioharness::EngineConfig;
//!
//! let config = EngineConfig::from_yaml_str(
//!     "player:\n  default_delay_secs: 2.0\nclock:\n  correction_enabled: false\n",
//! )
//! .unwrap();
//! assert_eq!(config.player.default_delay_secs, 2.0);
//! assert_eq!(config.history.length_secs, 20.0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::{HarnessError, Result};

/// Top-level configuration for one device session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub clock: ClockConfig,
    pub player: PlayerConfig,
    pub heartbeat: HeartbeatConfig,
    pub driver: DriverConfig,
    /// Wraparound of the per-stream packet sequence counter
    pub sequence_modulus: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            clock: ClockConfig::default(),
            player: PlayerConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            driver: DriverConfig::default(),
            sequence_modulus: 256,
        }
    }
}

/// Retention of the in-memory stream history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples and events older than `now - length_secs` are evicted
    pub length_secs: f64,
    /// Minimum time between two eviction passes
    pub eviction_interval_secs: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { length_secs: 20.0, eviction_interval_secs: 5.0 }
    }
}

/// Device-to-host clock difference estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Disable for deterministic offline replay
    pub correction_enabled: bool,
    /// Number of trailing offsets averaged per stream
    pub window: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { correction_enabled: true, window: 60 }
    }
}

/// Delayed real-time playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_delay_secs: f64,
    pub tick_period_ms: u64,
    /// Per-stream delay overrides keyed by stream name
    pub stream_delays: BTreeMap<String, f64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { default_delay_secs: 1.2, tick_period_ms: 10, stream_delays: BTreeMap::new() }
    }
}

impl PlayerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Delay applied to `stream`, falling back to the default delay
    pub fn delay_for(&self, stream: &str) -> f64 {
        self.stream_delays.get(stream).copied().unwrap_or(self.default_delay_secs)
    }
}

/// HxM heartbeat timestamp reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Observations of transit latency whose minimum is taken
    pub latency_window: usize,
    /// Minima averaged into the offset estimate
    pub offset_window: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { latency_window: 30, offset_window: 5 }
    }
}

/// Byte read loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Maximum bytes requested from the transport per read
    pub read_chunk_size: usize,
    /// Send the channel-enable and summary-interval frames on start
    pub enable_periodic_packets: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { read_chunk_size: 1, enable_periodic_packets: true }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| HarnessError::config_error(format!("YAML parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&contents)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| HarnessError::config_error(format!("YAML serialization failed: {}", e)))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.history.length_secs.is_finite() || self.history.length_secs <= 0.0 {
            return Err(HarnessError::config_error("history.length_secs must be positive and finite"));
        }
        require_seconds("history.eviction_interval_secs", self.history.eviction_interval_secs)?;
        if self.clock.window == 0 {
            return Err(HarnessError::config_error("clock.window must be at least 1"));
        }
        require_seconds("player.default_delay_secs", self.player.default_delay_secs)?;
        for (name, delay) in &self.player.stream_delays {
            require_seconds(&format!("player.stream_delays.{}", name), *delay)?;
        }
        if self.player.tick_period_ms == 0 {
            return Err(HarnessError::config_error("player.tick_period_ms must be at least 1"));
        }
        if self.heartbeat.latency_window == 0 || self.heartbeat.offset_window == 0 {
            return Err(HarnessError::config_error("heartbeat windows must be at least 1"));
        }
        if self.driver.read_chunk_size == 0 {
            return Err(HarnessError::config_error("driver.read_chunk_size must be at least 1"));
        }
        if self.sequence_modulus == 0 || self.sequence_modulus > 256 {
            return Err(HarnessError::config_error("sequence_modulus must be in 1..=256"));
        }
        Ok(())
    }
}

/// Durations feed `Duration::from_secs_f64` and clock arithmetic
fn require_seconds(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(HarnessError::config_error(format!(
            "{} must be a finite, non-negative number of seconds",
            field
        )));
    }
    Ok(())
}
