//! Performance metrics over a trade log.
//!
//! The equity curve here is trade-based: `initial + cumulative net PnL`, one
//! point per closed trade. Every metric is a pure function of the trade list
//! and starting capital. Unbounded ratios are capped at `RATIO_CAP`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tradelab_core::domain::TradeRecord;

/// Ceiling for ratios that would otherwise be infinite.
pub const RATIO_CAP: f64 = 9999.0;

pub const DEFAULT_ANNUALIZATION: f64 = 252.0;

/// Objective value for a summary with too few trades, maximized metrics.
pub const INVALID_MAXIMIZE: f64 = -1.0;
/// Objective value for a summary with too few trades, minimized metrics (already negated).
pub const INVALID_MINIMIZE: f64 = -1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    Maximize,
    Minimize,
}

/// Which metric drives trial selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveMetric {
    #[default]
    Calmar,
    Sharpe,
    Sortino,
    ProfitFactor,
    PnlToDrawdown,
    Sqn,
    Pnl,
    WinRate,
    MaxDrawdown,
    /// Profit factor (capped at 10) × win rate / max drawdown.
    Custom,
}

impl ObjectiveMetric {
    pub const ALL: [ObjectiveMetric; 10] = [
        Self::Calmar,
        Self::Sharpe,
        Self::Sortino,
        Self::ProfitFactor,
        Self::PnlToDrawdown,
        Self::Sqn,
        Self::Pnl,
        Self::WinRate,
        Self::MaxDrawdown,
        Self::Custom,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Calmar => "calmar",
            Self::Sharpe => "sharpe",
            Self::Sortino => "sortino",
            Self::ProfitFactor => "profit_factor",
            Self::PnlToDrawdown => "pnl_to_drawdown",
            Self::Sqn => "sqn",
            Self::Pnl => "pnl",
            Self::WinRate => "win_rate",
            Self::MaxDrawdown => "max_drawdown",
            Self::Custom => "custom",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Calmar => "Annualized return / max drawdown",
            Self::Sharpe => "Mean / std of trade-to-trade returns, annualized",
            Self::Sortino => "Mean / downside std of trade-to-trade returns, annualized",
            Self::ProfitFactor => "Gross profit / gross loss",
            Self::PnlToDrawdown => "Net PnL / (max drawdown * capital)",
            Self::Sqn => "System quality number: sqrt(n) * mean / std of trade PnL",
            Self::Pnl => "Net PnL",
            Self::WinRate => "Fraction of winning trades",
            Self::MaxDrawdown => "Peak-to-trough decline of the trade equity curve",
            Self::Custom => "Profit factor (capped at 10) * win rate / max drawdown",
        }
    }

    pub fn direction(&self) -> MetricDirection {
        match self {
            Self::MaxDrawdown => MetricDirection::Minimize,
            _ => MetricDirection::Maximize,
        }
    }

    pub fn extract(&self, m: &TradeMetrics) -> f64 {
        match self {
            Self::Calmar => m.calmar,
            Self::Sharpe => m.sharpe,
            Self::Sortino => m.sortino,
            Self::ProfitFactor => m.profit_factor,
            Self::PnlToDrawdown => m.pnl_to_drawdown,
            Self::Sqn => m.sqn,
            Self::Pnl => m.pnl,
            Self::WinRate => m.win_rate,
            Self::MaxDrawdown => m.max_drawdown,
            Self::Custom => m.custom,
        }
    }

    /// Objective for `m`, oriented so that higher is always better.
    pub fn objective(&self, m: &TradeMetrics) -> f64 {
        if !m.valid {
            return match self.direction() {
                MetricDirection::Maximize => INVALID_MAXIMIZE,
                MetricDirection::Minimize => INVALID_MINIMIZE,
            };
        }
        match self.direction() {
            MetricDirection::Maximize => self.extract(m),
            MetricDirection::Minimize => -self.extract(m),
        }
    }
}

impl fmt::Display for ObjectiveMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ObjectiveMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.key() == s)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Summary statistics for a trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMetrics {
    /// False with fewer than two trades; ratio fields are then zero.
    pub valid: bool,
    pub trade_count: usize,
    pub pnl: f64,
    pub win_rate: f64,
    /// Positive fraction of the running peak.
    pub max_drawdown: f64,
    pub calmar: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub profit_factor: f64,
    pub pnl_to_drawdown: f64,
    pub sqn: f64,
    pub custom: f64,
}

impl TradeMetrics {
    fn invalid(trades: &[TradeRecord]) -> Self {
        Self {
            valid: false,
            trade_count: trades.len(),
            pnl: trades.iter().map(|t| t.net_pnl).sum(),
            win_rate: win_rate(trades),
            max_drawdown: 0.0,
            calmar: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            profit_factor: 0.0,
            pnl_to_drawdown: 0.0,
            sqn: 0.0,
            custom: 0.0,
        }
    }

    /// Compute every metric. `trades` should be in close order.
    pub fn compute(trades: &[TradeRecord], initial_capital: f64, annualization: f64) -> Self {
        if trades.len() < 2 || initial_capital <= 0.0 {
            return Self::invalid(trades);
        }
        let pnls: Vec<f64> = trades.iter().map(|t| t.net_pnl).collect();
        let equity = equity_curve(&pnls, initial_capital);
        let returns = pct_changes(&equity);
        let pnl: f64 = pnls.iter().sum();
        let mdd = max_drawdown(&equity);
        let pf = profit_factor(&pnls);
        let wr = win_rate(trades);

        Self {
            valid: true,
            trade_count: trades.len(),
            pnl,
            win_rate: wr,
            max_drawdown: mdd,
            calmar: calmar(pnl, initial_capital, mdd, calendar_days(trades)),
            sharpe: sharpe(&returns, annualization),
            sortino: sortino(&returns, annualization),
            profit_factor: pf,
            pnl_to_drawdown: if mdd == 0.0 {
                if pnl > 0.0 {
                    RATIO_CAP
                } else {
                    0.0
                }
            } else {
                cap(pnl / (mdd * initial_capital))
            },
            sqn: sqn(&pnls),
            custom: if mdd == 0.0 {
                RATIO_CAP
            } else {
                cap(pf.min(10.0) * wr / mdd)
            },
        }
    }
}

/// Objective scalar plus the statistics it was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub objective: f64,
    pub summary: TradeMetrics,
}

/// Turns a trade log into an objective value.
pub trait MetricsCalculator: Send + Sync {
    fn evaluate(&self, trades: &[TradeRecord], initial_capital: f64) -> Evaluation;
}

/// Built-in calculator over [`TradeMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct TradeMetricsCalculator {
    pub metric: ObjectiveMetric,
    pub annualization: f64,
}

impl TradeMetricsCalculator {
    pub fn new(metric: ObjectiveMetric) -> Self {
        Self {
            metric,
            annualization: DEFAULT_ANNUALIZATION,
        }
    }
}

impl MetricsCalculator for TradeMetricsCalculator {
    fn evaluate(&self, trades: &[TradeRecord], initial_capital: f64) -> Evaluation {
        let summary = TradeMetrics::compute(trades, initial_capital, self.annualization);
        Evaluation {
            objective: self.metric.objective(&summary),
            summary,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

fn cap(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-RATIO_CAP, RATIO_CAP)
    }
}

/// `initial + cumulative pnl`, one point per trade.
pub fn equity_curve(pnls: &[f64], initial_capital: f64) -> Vec<f64> {
    pnls.iter()
        .scan(initial_capital, |equity, pnl| {
            *equity += pnl;
            Some(*equity)
        })
        .collect()
}

fn pct_changes(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Positive fraction; 0.0 for a non-decreasing curve.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.max((peak - eq) / peak);
        }
    }
    worst
}

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.net_pnl > 0.0).count() as f64 / trades.len() as f64
}

/// Gross profit / gross loss. 1.0 when nothing was won or lost.
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if loss == 0.0 {
        return if profit > 0.0 { RATIO_CAP } else { 1.0 };
    }
    cap(profit / loss)
}

pub fn sharpe(returns: &[f64], annualization: f64) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 {
        return 0.0;
    }
    cap(mean(returns) / sd * annualization.sqrt())
}

pub fn sortino(returns: &[f64], annualization: f64) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sd = std_dev(&downside);
    let m = mean(returns);
    if sd == 0.0 {
        return if m > 0.0 { RATIO_CAP } else { 0.0 };
    }
    cap(m / sd * annualization.sqrt())
}

/// Calendar days from the earliest entry to the latest exit, at least 1.
/// A merged log is in close order, so its first trade need not be the first opened.
fn calendar_days(trades: &[TradeRecord]) -> i64 {
    let first_entry = trades.iter().map(|t| t.entry_timestamp).min();
    let last_exit = trades.iter().map(|t| t.exit_timestamp).max();
    match first_entry.zip(last_exit) {
        Some((start, end)) => (end - start).num_days().max(1),
        None => 1,
    }
}

pub fn calmar(pnl: f64, initial_capital: f64, mdd: f64, days: i64) -> f64 {
    if mdd == 0.0 {
        return if pnl > 0.0 { RATIO_CAP } else { 0.0 };
    }
    let growth = 1.0 + pnl / initial_capital;
    let annualized = if growth > 0.0 {
        growth.powf(365.0 / days as f64) - 1.0
    } else {
        -1.0
    };
    cap(annualized / mdd)
}

pub fn sqn(pnls: &[f64]) -> f64 {
    let sd = std_dev(pnls);
    if sd == 0.0 {
        return 0.0;
    }
    cap((pnls.len() as f64).sqrt() * mean(pnls) / sd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tradelab_core::domain::{OrderOrigin, PositionSide};

    fn trade(day: i64, net: f64) -> TradeRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TradeRecord {
            instrument: "X".into(),
            side: PositionSide::Long,
            entry_bar: 0,
            entry_timestamp: t0 + Duration::days(day),
            entry_price: 100.0,
            exit_bar: 1,
            exit_timestamp: t0 + Duration::days(day + 1),
            exit_price: 100.0 + net,
            exit_reason: OrderOrigin::Signal,
            quantity: 1.0,
            gross_pnl: net,
            commission: 0.0,
            net_pnl: net,
        }
    }

    #[test]
    fn fewer_than_two_trades_is_invalid() {
        let calc = TradeMetricsCalculator::new(ObjectiveMetric::Sharpe);
        let eval = calc.evaluate(&[trade(0, 10.0)], 1000.0);
        assert!(!eval.summary.valid);
        assert_eq!(eval.objective, INVALID_MAXIMIZE);

        let calc = TradeMetricsCalculator::new(ObjectiveMetric::MaxDrawdown);
        assert_eq!(calc.evaluate(&[], 1000.0).objective, INVALID_MINIMIZE);
    }

    #[test]
    fn drawdown_profit_factor_and_win_rate() {
        let trades = [trade(0, 100.0), trade(1, -220.0), trade(2, 50.0)];
        let m = TradeMetrics::compute(&trades, 1000.0, DEFAULT_ANNUALIZATION);
        assert!(m.valid);
        // equity 1100 → 880 → 930
        assert!((m.max_drawdown - 0.2).abs() < 1e-12);
        assert!((m.profit_factor - 150.0 / 220.0).abs() < 1e-12);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.pnl - (-70.0)).abs() < 1e-12);
        assert!((m.pnl_to_drawdown - (-70.0 / 200.0)).abs() < 1e-12);
    }

    #[test]
    fn all_winners_cap_unbounded_ratios() {
        let trades = [trade(0, 10.0), trade(1, 20.0), trade(2, 30.0)];
        let m = TradeMetrics::compute(&trades, 1000.0, DEFAULT_ANNUALIZATION);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.profit_factor, RATIO_CAP);
        assert_eq!(m.calmar, RATIO_CAP);
        assert_eq!(m.sortino, RATIO_CAP);
        assert_eq!(m.custom, RATIO_CAP);
    }

    #[test]
    fn sqn_matches_formula() {
        let pnls = [10.0, -5.0, 20.0, 5.0];
        let mean = 7.5_f64;
        let sd = ((2.5_f64.powi(2) + 12.5_f64.powi(2) + 12.5_f64.powi(2) + 2.5_f64.powi(2)) / 3.0).sqrt();
        assert!((sqn(&pnls) - 2.0 * mean / sd).abs() < 1e-12);
    }

    #[test]
    fn minimized_metric_is_negated() {
        let trades = [trade(0, 100.0), trade(1, -220.0), trade(2, 50.0)];
        let eval = TradeMetricsCalculator::new(ObjectiveMetric::MaxDrawdown).evaluate(&trades, 1000.0);
        assert!((eval.objective + 0.2).abs() < 1e-12);
    }

    #[test]
    fn metric_keys_round_trip() {
        for metric in ObjectiveMetric::ALL {
            assert_eq!(metric.key().parse::<ObjectiveMetric>(), Ok(metric));
        }
        assert!("nope".parse::<ObjectiveMetric>().is_err());
    }

    #[test]
    fn calmar_uses_calendar_days() {
        // +10% over 365 days with a 5% drawdown → 2.0
        assert!((calmar(100.0, 1000.0, 0.05, 365) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn calendar_span_starts_at_earliest_entry() {
        // Closes first but opened later than the second trade.
        let short_hold = trade(10, 5.0);
        let mut long_hold = trade(12, 5.0);
        long_hold.entry_timestamp = trade(0, 0.0).entry_timestamp;
        assert_eq!(calendar_days(&[short_hold, long_hold]), 13);
        assert_eq!(calendar_days(&[]), 1);
    }
}
