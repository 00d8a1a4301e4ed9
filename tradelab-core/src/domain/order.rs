//! Orders: what the Portfolio asks the execution handler to do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, SignalId};
use super::signal::SignalDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Side that opens a position in the given direction. `Close` has no entry side.
    pub fn for_entry(direction: SignalDirection) -> Option<Self> {
        match direction {
            SignalDirection::Long => Some(OrderSide::Buy),
            SignalDirection::Short => Some(OrderSide::Sell),
            SignalDirection::Close => None,
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderType {
    /// Fill at the market. Signal orders are of this type.
    Market,
    /// Protective stop: fills at the trigger level once breached.
    Stop { trigger_price: f64 },
    /// Fill at the limit level. Take-profit exits are of this type.
    Limit { limit_price: f64 },
}

impl OrderType {
    /// Price level the order is anchored to, if any.
    pub fn level(&self) -> Option<f64> {
        match *self {
            OrderType::Market => None,
            OrderType::Stop { trigger_price } => Some(trigger_price),
            OrderType::Limit { limit_price } => Some(limit_price),
        }
    }
}

/// Why an order exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    Signal,
    StopLoss,
    TakeProfit,
    /// Forced flat at end of data.
    EndOfData,
}

impl OrderOrigin {
    pub fn is_protective(self) -> bool {
        matches!(self, OrderOrigin::StopLoss | OrderOrigin::TakeProfit)
    }
}

/// A single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub origin: OrderOrigin,
    pub signal_id: Option<SignalId>,
    pub created_at: DateTime<Utc>,
    /// Bar index the order was created on.
    pub created_bar: usize,
    /// Protective levels to attach to the position this order opens.
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Order {
    pub fn is_protective(&self) -> bool {
        self.origin.is_protective()
    }
}
