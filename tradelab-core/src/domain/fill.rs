use crate::domain::ids::{FillId, OrderId};
use crate::domain::order::{OrderOrigin, OrderSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fill record. The only thing allowed to mutate a Portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub side: OrderSide,
    pub origin: OrderOrigin,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    /// Price the fill would have had without slippage.
    pub ideal_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Fill {
    /// Cost of slippage in currency, always non-negative for adverse fills.
    pub fn slippage_cost(&self) -> f64 {
        match self.side {
            OrderSide::Buy => (self.price - self.ideal_price) * self.quantity,
            OrderSide::Sell => (self.ideal_price - self.price) * self.quantity,
        }
    }
}
