//! Engine configuration with validation and defaults
//!
//! Room definitions and bot rosters are data owned by the admin surface;
//! this module only configures how the engine itself runs them.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub timing: TimingConfig,
    pub rules: SessionRules,
    pub bots: BotFillConfig,
    pub retry: RetryConfig,
    pub observer: ObserverConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            rules: SessionRules::default(),
            bots: BotFillConfig::default(),
            retry: RetryConfig::default(),
            observer: ObserverConfig::default(),
        }
    }
}

/// Lobby and supervision cadence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Tick length while a session is waiting or counting down
    pub lobby_tick_ms: u64,
    /// Lobby ticks spent in countdown before a round goes active
    pub countdown_ticks: u32,
    /// How often the scheduler sweeps rooms for session creation/retirement
    pub scheduler_poll_ms: u64,
    /// When set, overrides every room's call interval (simulation runs)
    #[serde(default)]
    pub call_override_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lobby_tick_ms: 1_000,
            countdown_ticks: 10,
            scheduler_poll_ms: 500,
            call_override_ms: None,
        }
    }
}

/// Round formation rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRules {
    /// Participants required before the countdown may start
    pub min_participants: usize,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            min_participants: 2,
        }
    }
}

/// How eagerly bots fill open seats
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotFillConfig {
    /// Per lobby tick, the chance that one bot is recruited into the session
    pub join_probability: f64,
}

impl Default for BotFillConfig {
    fn default() -> Self {
        Self {
            join_probability: 0.6,
        }
    }
}

/// Backoff policy for persistence writes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given zero-based attempt number
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(10);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Buffers for the read-only observation surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Broadcast buffer for session events; slow observers get lag errors
    pub event_buffer: usize,
    /// Terminal sessions kept around for the monitor's recent list
    pub history_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1_024,
            history_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Configuration for compressed simulation runs: short lobbies, rapid
    /// calls, eager bots.
    pub fn fast_simulation() -> Self {
        Self {
            timing: TimingConfig {
                lobby_tick_ms: 50,
                countdown_ticks: 3,
                scheduler_poll_ms: 25,
                call_override_ms: Some(100),
            },
            bots: BotFillConfig {
                join_probability: 0.9,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.lobby_tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "lobby_tick_ms must be > 0".to_string(),
            ));
        }
        if self.timing.countdown_ticks == 0 {
            return Err(ConfigError::InvalidValue(
                "countdown_ticks must be > 0".to_string(),
            ));
        }
        if self.timing.scheduler_poll_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler_poll_ms must be > 0".to_string(),
            ));
        }
        if matches!(self.timing.call_override_ms, Some(0)) {
            return Err(ConfigError::InvalidValue(
                "call_override_ms must be > 0 when set".to_string(),
            ));
        }
        if self.rules.min_participants < 2 {
            return Err(ConfigError::LogicalInconsistency(
                "a round needs at least 2 participants".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.bots.join_probability) {
            return Err(ConfigError::InvalidValue(
                "join_probability must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        if self.observer.event_buffer == 0 || self.observer.history_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "observer buffers must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn lobby_tick(&self) -> Duration {
        Duration::from_millis(self.timing.lobby_tick_ms)
    }

    pub fn scheduler_poll(&self) -> Duration {
        Duration::from_millis(self.timing.scheduler_poll_ms)
    }
}
