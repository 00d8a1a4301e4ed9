//! Signal: a strategy's declared intent for one bar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SignalId;

/// What the strategy wants to happen to its instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Long,
    Short,
    Close,
}

/// Intent emitted by a strategy; not yet an order.
///
/// At most one per bar per strategy instance. The Portfolio turns it into an
/// order (or ignores it) within the same processing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub direction: SignalDirection,
    pub strategy_id: String,
    /// Close of the bar that produced the signal.
    pub price: f64,
    /// Conviction in [0, 1]. Reference strategies always emit 1.0.
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub interval: Option<String>,
}

fn default_strength() -> f64 {
    1.0
}

impl Signal {
    pub fn new(
        strategy_id: impl Into<String>,
        instrument: impl Into<String>,
        direction: SignalDirection,
        timestamp: DateTime<Utc>,
        price: f64,
    ) -> Self {
        Self {
            id: SignalId(0),
            timestamp,
            instrument: instrument.into(),
            direction,
            strategy_id: strategy_id.into(),
            price,
            strength: 1.0,
            interval: None,
        }
    }
}
