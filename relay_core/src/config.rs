//! Configuration for the player, the display stores and the pipeline feed.
//!
//! Every section has a `Default` matching the demo front-end; a JSON file
//! may override any subset of fields.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RelayError, Result};

/// Scenario player settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Maximum number of events kept in the timeline history
    pub history_cap: usize,

    /// Initial speed multiplier (kept across `start` calls that omit one)
    pub default_speed: f64,

    /// Buffer of the event broadcast channel (slow subscribers lag past it)
    pub event_channel_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            history_cap: 2000,
            default_speed: 1.0,
            event_channel_capacity: 256,
        }
    }
}

/// Display store settings (all durations in milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Messages kept in history
    pub message_cap: usize,

    /// Size of the "recent messages" window
    pub recent_window: usize,

    /// How long a connection stays in flight after a message
    pub in_flight_ms: u64,

    /// Connections idle longer than this are deactivated
    pub stale_after_ms: u64,

    /// Delay between an agent spawn and it becoming active
    pub spawn_settle_ms: u64,

    /// Delay between an agent release and its removal
    pub release_linger_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            message_cap: 100,
            recent_window: 20,
            in_flight_ms: 800,
            stale_after_ms: 5000,
            spawn_settle_ms: 300,
            release_linger_ms: 200,
        }
    }
}

/// Relay pipeline dashboard feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Events kept, newest first
    pub history_cap: usize,

    /// Interval between generated events
    pub tick_ms: u64,

    /// Probability that a generated event succeeds
    pub success_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_cap: 50,
            tick_ms: 1050,
            success_rate: 0.92,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub player: PlayerConfig,
    pub stores: StoreConfig,
    pub pipeline: PipelineConfig,
}

impl RelayConfig {
    /// Loads a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: RelayConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.player.history_cap == 0 {
            return Err(RelayError::config("player.history_cap must be at least 1"));
        }
        if self.player.event_channel_capacity == 0 {
            return Err(RelayError::config("player.event_channel_capacity must be at least 1"));
        }
        if !(self.player.default_speed.is_finite() && self.player.default_speed > 0.0) {
            return Err(RelayError::config(format!(
                "player.default_speed must be positive, got {}",
                self.player.default_speed
            )));
        }
        if self.pipeline.history_cap == 0 {
            return Err(RelayError::config("pipeline.history_cap must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.pipeline.success_rate) {
            return Err(RelayError::config("pipeline.success_rate must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.player.history_cap, 2000);
        assert_eq!(config.stores.in_flight_ms, 800);
        assert_eq!(config.stores.stale_after_ms, 5000);
        assert_eq!(config.pipeline.history_cap, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"player":{"history_cap":10}}"#).unwrap();
        assert_eq!(config.player.history_cap, 10);
        assert_eq!(config.player.default_speed, 1.0);
        assert_eq!(config.stores, StoreConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_speed() {
        let mut config = RelayConfig::default();
        config.player.default_speed = 0.0;
        assert!(matches!(config.validate(), Err(RelayError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RelayConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
