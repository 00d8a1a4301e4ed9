//! Portfolio: cash, open positions, pending-order locks and the trade log.

use super::position::Position;
use super::trade::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Aggregate portfolio state for one engine run.
///
/// Cash-based accounting: opening a position does not debit cash; closing one
/// realizes net PnL into cash. `BTreeMap`/`BTreeSet` keep iteration order
/// stable so protective checks run in the same order on every replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    /// Instruments with an order in flight. New signals on these are ignored.
    pub pending: BTreeSet<String>,
    pub trades: Vec<TradeRecord>,
    pub realized_pnl: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            pending: BTreeSet::new(),
            trades: Vec::new(),
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_slippage: 0.0,
        }
    }

    /// Total equity = cash + unrealized PnL of open positions.
    ///
    /// Instruments without a price in `prices` are marked at entry (zero PnL).
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let unrealized: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.instrument).copied().unwrap_or(pos.entry_price);
                pos.unrealized_pnl(price)
            })
            .sum();
        self.cash + unrealized
    }

    /// Funds available for a new entry.
    pub fn available_capital(&self) -> f64 {
        self.cash
    }

    pub fn has_position(&self, instrument: &str) -> bool {
        self.positions.contains_key(instrument)
    }

    pub fn get_position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn has_pending(&self, instrument: &str) -> bool {
        self.pending.contains(instrument)
    }
}
