//! Engine configuration, run counters, and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, FillId, OrderId, Portfolio, SignalId, TradeRecord};

use super::accounting::EquityPoint;
use super::event::TraceEntry;

/// When a signal's market order fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTiming {
    /// Deferred to the next bar's open (the signal was computed on the close).
    #[default]
    NextOpen,
    /// Filled in the same drain at the signal bar's close.
    SameClose,
}

/// Volume- and volatility-driven slippage.
///
/// `fraction = impact * sqrt(min(qty / volume, 1)) + volatility_factor * (high - low) / close`,
/// capped at `max_slippage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippageModel {
    pub impact: f64,
    pub volatility_factor: f64,
    pub max_slippage: f64,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self {
            impact: 0.1,
            volatility_factor: 0.0,
            max_slippage: 0.20,
        }
    }
}

impl SlippageModel {
    pub fn frictionless() -> Self {
        Self {
            impact: 0.0,
            volatility_factor: 0.0,
            max_slippage: 0.0,
        }
    }

    /// Slippage as a fraction of price for `quantity` traded on `bar`.
    pub fn fraction(&self, quantity: f64, bar: &Bar) -> f64 {
        let size_term = if bar.volume > 0.0 {
            self.impact * (quantity / bar.volume).min(1.0).sqrt()
        } else {
            0.0
        };
        let vol_term = self.volatility_factor * bar.range_fraction();
        (size_term + vol_term).clamp(0.0, self.max_slippage)
    }
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Charged on notional, per fill.
    pub commission_rate: f64,
    pub slippage: SlippageModel,
    /// Cap on a single entry's notional as a fraction of capital.
    pub max_exposure: f64,
    /// Quantities are rounded down to a multiple of this. 0 disables rounding.
    pub lot_step: f64,
    pub fill_timing: FillTiming,
    /// Flatten open positions at the last close instead of leaving them open.
    pub close_at_end: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 500_000.0,
            commission_rate: 0.0005,
            slippage: SlippageModel::default(),
            max_exposure: 0.2,
            lot_step: 1.0,
            fill_timing: FillTiming::NextOpen,
            close_at_end: false,
        }
    }
}

impl EngineConfig {
    pub fn with_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    /// No slippage, no commission. Handy for reasoning about exact prices.
    pub fn frictionless() -> Self {
        Self {
            commission_rate: 0.0,
            slippage: SlippageModel::frictionless(),
            ..Self::default()
        }
    }
}

/// Monotonic ID source for one run.
#[derive(Debug, Default, Clone)]
pub struct IdGen {
    order: u64,
    fill: u64,
    signal: u64,
}

impl IdGen {
    pub fn next_order(&mut self) -> OrderId {
        self.order += 1;
        OrderId(self.order)
    }

    pub fn next_fill(&mut self) -> FillId {
        self.fill += 1;
        FillId(self.fill)
    }

    pub fn next_signal(&mut self) -> SignalId {
        self.signal += 1;
        SignalId(self.signal)
    }
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub bars: usize,
    pub signals: usize,
    pub ignored_signals: usize,
    pub rejected_entries: usize,
    pub orders: usize,
    pub fills: usize,
    pub protective_exits: usize,
    pub dropped_orders: usize,
    pub cancelled_orders: usize,
}

/// Output of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub instrument: String,
    pub strategy_id: String,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_capital: f64,
    /// Cash after all realized trades.
    pub ending_capital: f64,
    /// Cash plus unrealized PnL at the last close.
    pub ending_equity: f64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub portfolio: Portfolio,
    pub stats: RunStats,
    #[serde(skip)]
    pub trace: Vec<TraceEntry>,
}

impl BacktestResult {
    pub fn net_pnl(&self) -> f64 {
        self.ending_capital - self.initial_capital
    }

    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(volume: f64) -> Bar {
        Bar::new("X", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 100.0, 110.0, 90.0, 100.0, volume)
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.initial_capital, 500_000.0);
        assert_eq!(c.commission_rate, 0.0005);
        assert_eq!(c.slippage.impact, 0.1);
        assert_eq!(c.max_exposure, 0.2);
        assert_eq!(c.fill_timing, FillTiming::NextOpen);
    }

    #[test]
    fn slippage_size_term() {
        let m = SlippageModel::default();
        // 100 / 10_000 = 0.01 → sqrt 0.1 → 0.1 * 0.1 = 0.01
        assert!((m.fraction(100.0, &bar(10_000.0)) - 0.01).abs() < 1e-12);
        assert_eq!(m.fraction(100.0, &bar(0.0)), 0.0);
    }

    #[test]
    fn slippage_is_capped() {
        let m = SlippageModel {
            impact: 1.0,
            volatility_factor: 1.0,
            max_slippage: 0.2,
        };
        assert_eq!(m.fraction(1e9, &bar(1.0)), 0.2);
    }

    #[test]
    fn volatility_term_uses_range() {
        let m = SlippageModel {
            impact: 0.0,
            volatility_factor: 0.5,
            max_slippage: 0.2,
        };
        // range 20 / close 100 = 0.2 → 0.1
        assert!((m.fraction(1.0, &bar(1.0)) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn config_parses_partial_toml() {
        let c: EngineConfig = toml::from_str("initial_capital = 1000.0\nfill_timing = \"same_close\"").unwrap();
        assert_eq!(c.initial_capital, 1000.0);
        assert_eq!(c.fill_timing, FillTiming::SameClose);
        assert_eq!(c.commission_rate, 0.0005);
    }

    #[test]
    fn ids_increase() {
        let mut ids = IdGen::default();
        assert_eq!(ids.next_order(), OrderId(1));
        assert_eq!(ids.next_order(), OrderId(2));
        assert_eq!(ids.next_fill(), FillId(1));
    }
}
