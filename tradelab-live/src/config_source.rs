//! Where the desired set of running strategies comes from.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tradelab_core::config::{parse_strategy_list, StrategyConfig};

use crate::error::SourceError;

/// Polled by the orchestrator on every reconciliation pass.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn get_active_configs(&self) -> Result<Vec<StrategyConfig>, SourceError>;
}

/// In-memory target set, replaceable at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    configs: Arc<Mutex<Vec<StrategyConfig>>>,
}

impl StaticConfigSource {
    pub fn new(configs: Vec<StrategyConfig>) -> Self {
        Self {
            configs: Arc::new(Mutex::new(configs)),
        }
    }

    /// Replace the target set seen by the next poll.
    pub fn set(&self, configs: Vec<StrategyConfig>) {
        *self.configs.lock().unwrap_or_else(PoisonError::into_inner) = configs;
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn get_active_configs(&self) -> Result<Vec<StrategyConfig>, SourceError> {
        Ok(self
            .configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// `[[strategy]]` tables in a TOML file, re-read on every poll.
#[derive(Debug, Clone)]
pub struct TomlConfigSource {
    path: PathBuf,
}

impl TomlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for TomlConfigSource {
    async fn get_active_configs(&self) -> Result<Vec<StrategyConfig>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(parse_strategy_list(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_latest_set() {
        let source = StaticConfigSource::new(vec![StrategyConfig::new("sma_cross", "BTCUSDT")]);
        assert_eq!(source.get_active_configs().await.unwrap().len(), 1);
        source.set(Vec::new());
        assert!(source.get_active_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toml_source_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.toml");
        std::fs::write(
            &path,
            "[[strategy]]\nstrategy_id = \"sma_cross\"\ninstrument = \"BTCUSDT\"\n",
        )
        .unwrap();
        let source = TomlConfigSource::new(&path);
        assert_eq!(source.get_active_configs().await.unwrap()[0].instrument, "BTCUSDT");

        std::fs::write(&path, "").unwrap();
        assert!(source.get_active_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_or_broken_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = TomlConfigSource::new(dir.path().join("nope.toml"));
        assert!(matches!(
            missing.get_active_configs().await,
            Err(SourceError::Io { .. })
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[strategy]]\ninstrument = 3").unwrap();
        assert!(matches!(
            TomlConfigSource::new(&path).get_active_configs().await,
            Err(SourceError::Config(_))
        ));
    }
}
