//! Static strategy lookup table.
//!
//! Each entry pairs a strategy id with its parameter specs and a constructor.
//! `build_strategy` is the only place a `StrategyConfig` becomes a runnable
//! strategy, so validation lives here too.

use super::{mean_reversion, sma_cross, triple_filter, ConfiguredStrategy, Strategy};
use super::{MeanReversion, SmaCross, TripleFilter};
use crate::config::{ConfigError, StrategyConfig};
use crate::params::{merge_with_defaults, ParamSet, ParamSpec};
use crate::risk::RISK_PARAM_PREFIX;

/// One registered strategy.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    pub id: &'static str,
    pub description: &'static str,
    pub param_specs: fn() -> Vec<ParamSpec>,
    pub build: fn(&ParamSet) -> Result<Box<dyn Strategy>, ConfigError>,
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor").field("id", &self.id).finish()
    }
}

static REGISTRY: &[StrategyDescriptor] = &[
    StrategyDescriptor {
        id: sma_cross::ID,
        description: "Close crosses its simple moving average",
        param_specs: SmaCross::param_specs,
        build: SmaCross::build,
    },
    StrategyDescriptor {
        id: mean_reversion::ID,
        description: "Z-score reversion to the rolling mean",
        param_specs: MeanReversion::param_specs,
        build: MeanReversion::build,
    },
    StrategyDescriptor {
        id: triple_filter::ID,
        description: "Trend EMA + EMA impulse + volume filter",
        param_specs: TripleFilter::param_specs,
        build: TripleFilter::build,
    },
];

pub fn descriptors() -> &'static [StrategyDescriptor] {
    REGISTRY
}

pub fn lookup(id: &str) -> Result<&'static StrategyDescriptor, ConfigError> {
    REGISTRY
        .iter()
        .find(|d| d.id == id)
        .ok_or_else(|| ConfigError::UnknownStrategy(id.to_string()))
}

/// Validate a configuration and build its strategy.
///
/// Parameters missing from the config take their declared defaults. Any
/// `rm_`-prefixed entries are applied to the risk config rather than the
/// strategy.
pub fn build_strategy(config: &StrategyConfig) -> Result<ConfiguredStrategy, ConfigError> {
    if config.instrument.trim().is_empty() {
        return Err(ConfigError::Invalid("instrument must not be empty".into()));
    }
    let descriptor = lookup(&config.strategy_id)?;

    let (risk_params, strategy_params): (ParamSet, ParamSet) = config
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, _)| k.starts_with(RISK_PARAM_PREFIX));

    let params = merge_with_defaults(&(descriptor.param_specs)(), &strategy_params)?;
    let risk = config.risk.with_overrides(&risk_params)?;
    risk.validate()?;
    let strategy = (descriptor.build)(&params)?;

    let mut resolved = config.clone();
    resolved.params = params;
    resolved.risk = risk;
    Ok(ConfiguredStrategy::new(strategy, resolved))
}
