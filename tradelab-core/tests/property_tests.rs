//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: identical inputs give identical trade logs and capital
//! 2. Phase ordering: deferred orders resolve before any same-bar signal fill
//! 3. Accounting: with nothing open, ending equity equals ending cash
//! 4. At most one open position per instrument, never a pending lock left over

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use tradelab_core::config::StrategyConfig;
use tradelab_core::domain::{Bar, OrderOrigin};
use tradelab_core::engine::{run_backtest_on_bars, run_backtest_traced, EngineConfig, Phase, TraceKind};
use tradelab_core::params::ParamValue;
use tradelab_core::risk::RiskConfig;
use tradelab_core::strategy::build_strategy;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk of 60..200 hourly bars from 100.
fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-2.0..2.0_f64, 0.1..1.5_f64, 1_000.0..50_000.0_f64), 60..200).prop_map(|steps| {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut close = 100.0_f64;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (step, wick, volume))| {
                let open = close;
                close = (close + step).max(5.0);
                let high = open.max(close) + wick;
                let low = (open.min(close) - wick).max(1.0);
                Bar::new("BTCUSDT", base + Duration::hours(i as i64), open, high, low, close, volume)
            })
            .collect()
    })
}

fn arb_risk() -> impl Strategy<Value = RiskConfig> {
    prop_oneof![
        (0.5..5.0_f64, 1.0..3.0_f64).prop_map(|(pct, ratio)| RiskConfig::Fixed {
            risk_percent_long: pct,
            risk_percent_short: pct,
            tp_ratio: ratio,
        }),
        Just(RiskConfig::atr()),
    ]
}

fn sma_cross(period: i64, risk: RiskConfig) -> StrategyConfig {
    let mut config = StrategyConfig::new("sma_cross", "BTCUSDT").with_risk(risk);
    config.params.insert("sma_period".into(), ParamValue::Int(period));
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Same bars, strategy, params and cost model → byte-identical results.
    #[test]
    fn backtest_is_deterministic(bars in arb_bars(), period in 10i64..30, risk in arb_risk()) {
        let strategy = build_strategy(&sma_cross(period, risk)).unwrap();
        let config = EngineConfig::default();
        let a = run_backtest_on_bars(&strategy, &bars, &config).unwrap();
        let b = run_backtest_on_bars(&strategy, &bars, &config).unwrap();

        prop_assert_eq!(serde_json::to_string(&a.trades).unwrap(), serde_json::to_string(&b.trades).unwrap());
        prop_assert_eq!(a.ending_capital.to_bits(), b.ending_capital.to_bits());
        prop_assert_eq!(a.equity_values(), b.equity_values());
    }

    /// No signal-originated fill on a bar precedes that bar's pending resolution.
    #[test]
    fn pending_resolution_comes_first(bars in arb_bars(), period in 10i64..30) {
        let strategy = build_strategy(&sma_cross(period, RiskConfig::default())).unwrap();
        let result = run_backtest_traced(&strategy, &bars, &EngineConfig::default()).unwrap();

        for t in 0..bars.len() {
            let phases: Vec<Phase> = result
                .trace
                .iter()
                .filter(|e| e.bar_index == t)
                .map(|e| e.phase)
                .collect();
            let mut sorted = phases.clone();
            sorted.sort();
            prop_assert_eq!(&phases, &sorted, "bar {} phases out of order", t);

            let drain_signal_fill = result.trace.iter().position(|e| {
                e.bar_index == t
                    && e.phase == Phase::Drain
                    && matches!(e.kind, TraceKind::Filled { origin: OrderOrigin::Signal, .. })
            });
            let last_pending = result
                .trace
                .iter()
                .rposition(|e| e.bar_index == t && e.phase == Phase::PendingResolution);
            if let (Some(fill), Some(pending)) = (drain_signal_fill, last_pending) {
                prop_assert!(pending < fill);
            }
        }
    }

    /// Closed trades reconcile cash, and the portfolio ends without stale locks.
    #[test]
    fn cash_reconciles_with_trade_log(bars in arb_bars(), period in 10i64..30, risk in arb_risk()) {
        let strategy = build_strategy(&sma_cross(period, risk)).unwrap();
        let config = EngineConfig { close_at_end: true, ..EngineConfig::default() };
        let result = run_backtest_on_bars(&strategy, &bars, &config).unwrap();

        let net: f64 = result.trades.iter().map(|t| t.net_pnl).sum();
        prop_assert!((result.ending_capital - (config.initial_capital + net)).abs() < 1e-6);
        prop_assert!(result.portfolio.positions.is_empty());
        prop_assert!(result.portfolio.pending.is_empty());
        prop_assert!((result.ending_equity - result.ending_capital).abs() < 1e-9);
        prop_assert_eq!(result.equity_curve.len(), bars.len());
        for trade in &result.trades {
            prop_assert!(trade.exit_bar >= trade.entry_bar);
            prop_assert!(trade.quantity > 0.0);
        }
    }
}
