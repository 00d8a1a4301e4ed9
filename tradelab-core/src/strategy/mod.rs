//! Strategy capability interface and the reference strategies.
//!
//! A strategy is a pure function over bar history: `process_data` enriches the
//! history with indicator columns, `on_candle` looks at the latest bar (and the
//! ones before it) and returns at most one `Signal`. Strategies never see the
//! portfolio.

pub mod mean_reversion;
pub mod registry;
pub mod sma_cross;
pub mod triple_filter;

pub use mean_reversion::MeanReversion;
pub use registry::{build_strategy, descriptors, lookup, StrategyDescriptor};
pub use sma_cross::SmaCross;
pub use triple_filter::TripleFilter;

use crate::config::StrategyConfig;
use crate::domain::{Bar, Signal, SignalDirection};
use crate::indicators::{enrich, Indicator};
use crate::risk::RiskConfig;

/// Everything `on_candle` may look at: the enriched history up to and
/// including the current bar.
#[derive(Debug, Clone, Copy)]
pub struct CandleContext<'a> {
    pub strategy_id: &'a str,
    pub interval: Option<&'a str>,
    history: &'a [Bar],
}

impl<'a> CandleContext<'a> {
    /// `history` must be non-empty; its last element is the current bar.
    pub fn new(strategy_id: &'a str, interval: Option<&'a str>, history: &'a [Bar]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        Some(Self {
            strategy_id,
            interval,
            history,
        })
    }

    pub fn history(&self) -> &'a [Bar] {
        self.history
    }

    pub fn current(&self) -> &'a Bar {
        &self.history[self.history.len() - 1]
    }

    pub fn previous(&self) -> Option<&'a Bar> {
        self.history.len().checked_sub(2).map(|i| &self.history[i])
    }

    /// Index of the current bar within `history`.
    pub fn index(&self) -> usize {
        self.history.len() - 1
    }

    /// Signal for the current bar, priced at its close.
    pub fn signal(&self, direction: SignalDirection) -> Signal {
        let bar = self.current();
        let mut signal = Signal::new(
            self.strategy_id,
            bar.symbol.clone(),
            direction,
            bar.timestamp,
            bar.close,
        );
        signal.interval = self.interval.map(str::to_string);
        signal
    }
}

/// Pluggable strategy capability.
pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;

    /// Bars of history required before `on_candle` can produce anything.
    fn min_history(&self) -> usize;

    /// Indicator columns this strategy reads.
    fn indicators(&self) -> Vec<Box<dyn Indicator>>;

    /// Enrich raw bars with this strategy's indicator columns.
    fn process_data(&self, history: &[Bar]) -> Vec<Bar> {
        enrich(history, &self.indicators())
    }

    fn on_candle(&self, ctx: &CandleContext<'_>) -> Option<Signal>;
}

/// A strategy bound to its configuration: instrument, interval, and the risk
/// manager whose indicators it must also compute.
pub struct ConfiguredStrategy {
    inner: Box<dyn Strategy>,
    config: StrategyConfig,
}

impl ConfiguredStrategy {
    pub fn new(inner: Box<dyn Strategy>, config: StrategyConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.config.risk
    }

    pub fn instrument(&self) -> &str {
        &self.config.instrument
    }

    /// Run `on_candle` over `history` (already enriched).
    pub fn evaluate(&self, history: &[Bar]) -> Option<Signal> {
        if history.len() < self.min_history() {
            return None;
        }
        let ctx = CandleContext::new(self.inner.id(), self.config.interval.as_deref(), history)?;
        self.inner.on_candle(&ctx)
    }
}

impl Strategy for ConfiguredStrategy {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn min_history(&self) -> usize {
        self.inner.min_history().max(self.config.risk.min_history())
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        let mut all = self.inner.indicators();
        for extra in self.config.risk.required_indicators() {
            if !all.iter().any(|i| i.name() == extra.name()) {
                all.push(extra);
            }
        }
        all
    }

    fn process_data(&self, history: &[Bar]) -> Vec<Bar> {
        let enriched = self.inner.process_data(history);
        enrich(&enriched, &self.config.risk.required_indicators())
    }

    fn on_candle(&self, ctx: &CandleContext<'_>) -> Option<Signal> {
        self.inner.on_candle(ctx)
    }
}

/// Strictly below the level on the previous bar, strictly above it now.
pub(crate) fn crossed_above(prev: f64, cur: f64, prev_level: f64, cur_level: f64) -> bool {
    prev < prev_level && cur > cur_level
}

pub(crate) fn crossed_below(prev: f64, cur: f64, prev_level: f64, cur_level: f64) -> bool {
    prev > prev_level && cur < cur_level
}
