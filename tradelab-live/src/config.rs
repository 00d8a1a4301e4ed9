//! Live service configuration, read from TOML.
//!
//! ```toml
//! poll_interval_secs = 10
//! grace_secs = 5
//! data_dir = "data"
//! replay_delay_ms = 250
//! signal_log = "signals.jsonl"
//!
//! [[strategy]]
//! strategy_id = "sma_cross"
//! instrument = "BTCUSDT"
//! interval = "1hour"
//! params = { sma_period = 20 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tradelab_core::config::{ConfigError, StrategyConfig};

use crate::feed::DEFAULT_STREAM_CAPACITY;
use crate::task::TaskSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub poll_interval_secs: u64,
    /// How long a cancelled task gets to stop before it is aborted.
    pub grace_secs: u64,
    pub history_buffer_multiplier: usize,
    pub watchdog_min_secs: u64,
    pub channel_capacity: usize,
    pub data_dir: PathBuf,
    /// Delay between replayed bars.
    pub replay_delay_ms: u64,
    pub signal_log: Option<PathBuf>,
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            grace_secs: 5,
            history_buffer_multiplier: 2,
            watchdog_min_secs: 300,
            channel_capacity: DEFAULT_STREAM_CAPACITY,
            data_dir: PathBuf::from("data"),
            replay_delay_ms: 0,
            signal_log: None,
            strategies: Vec::new(),
        }
    }
}

impl LiveConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        if self.history_buffer_multiplier == 0 {
            return Err(ConfigError::Invalid("history_buffer_multiplier must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            grace: Duration::from_secs(self.grace_secs),
            task: TaskSettings {
                history_buffer_multiplier: self.history_buffer_multiplier,
                watchdog_min: Duration::from_secs(self.watchdog_min_secs),
            },
        }
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }
}

/// Runtime knobs of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub grace: Duration,
    pub task: TaskSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        LiveConfig::default().orchestrator_settings()
    }
}
