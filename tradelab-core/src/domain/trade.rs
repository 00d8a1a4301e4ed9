//! TradeRecord: a completed round-trip trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderOrigin;
use super::position::PositionSide;

/// A complete round-trip trade record: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub instrument: String,
    pub side: PositionSide,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_timestamp: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: OrderOrigin,

    // ── Size ──
    pub quantity: f64,

    // ── PnL ──
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl TradeRecord {
    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.quantity == 0.0 {
            return 0.0;
        }
        self.net_pnl / (self.entry_price * self.quantity)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            instrument: "BTCUSDT".into(),
            side: PositionSide::Long,
            entry_bar: 4,
            entry_timestamp: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            entry_price: 100.0,
            exit_bar: 8,
            exit_timestamp: Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
            exit_price: 110.0,
            exit_reason: OrderOrigin::TakeProfit,
            quantity: 50.0,
            gross_pnl: 500.0,
            commission: 15.0,
            net_pnl: 485.0,
        }
    }

    #[test]
    fn return_pct_calculation() {
        let trade = sample_trade();
        let expected = 485.0 / (100.0 * 50.0);
        assert!((trade.return_pct() - expected).abs() < 1e-10);
    }

    #[test]
    fn is_winner_and_duration() {
        let trade = sample_trade();
        assert!(trade.is_winner());
        assert_eq!(trade.bars_held(), 4);
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        let json = serde_json::to_string(&sample_trade()).unwrap();
        assert!(json.contains("\"exit_reason\":\"take_profit\""));
    }
}
