//! Execution handler: turns an order plus a bar into a fill.
//!
//! `SimulatedExecution` stands in for a broker in backtests. The ideal price
//! is the order's trigger level when it has one, otherwise the bar open
//! (deferred market order) or close (same-close market order). Slippage is
//! always adverse; commission is charged on the filled notional.

use thiserror::Error;

use crate::domain::{Bar, Fill, FillId, Order, OrderId, OrderOrigin, OrderSide, OrderType};

use super::state::{EngineConfig, FillTiming, SlippageModel};

/// A simulated fill could not be produced. The order is dropped, not retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("order {order}: non-positive quantity {quantity}")]
    InvalidQuantity { order: OrderId, quantity: f64 },

    #[error("order {order}: computed fill price {price} is not a positive finite number")]
    InvalidPrice { order: OrderId, price: f64 },

    #[error("order {order}: commission {commission} is not finite")]
    InvalidCommission { order: OrderId, commission: f64 },
}

pub trait ExecutionHandler: Send + Sync {
    /// Whether `order` waits for the next bar instead of filling in the current drain.
    fn defers(&self, order: &Order) -> bool;

    fn execute(&self, order: &Order, bar: &Bar, fill_id: FillId) -> Result<Fill, ExecutionError>;
}

#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    commission_rate: f64,
    slippage: SlippageModel,
    timing: FillTiming,
}

impl SimulatedExecution {
    pub fn new(commission_rate: f64, slippage: SlippageModel, timing: FillTiming) -> Self {
        Self {
            commission_rate,
            slippage,
            timing,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.commission_rate, config.slippage, config.fill_timing)
    }

    fn ideal_price(&self, order: &Order, bar: &Bar) -> f64 {
        if let Some(level) = order.order_type.level() {
            return level;
        }
        match (order.origin, self.timing) {
            (OrderOrigin::EndOfData, _) | (_, FillTiming::SameClose) => bar.close,
            (_, FillTiming::NextOpen) => bar.open,
        }
    }
}

impl ExecutionHandler for SimulatedExecution {
    fn defers(&self, order: &Order) -> bool {
        self.timing == FillTiming::NextOpen
            && order.order_type == OrderType::Market
            && order.origin == OrderOrigin::Signal
    }

    fn execute(&self, order: &Order, bar: &Bar, fill_id: FillId) -> Result<Fill, ExecutionError> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(ExecutionError::InvalidQuantity {
                order: order.id,
                quantity: order.quantity,
            });
        }
        let ideal = self.ideal_price(order, bar);
        let slip = self.slippage.fraction(order.quantity, bar);
        let price = match order.side {
            OrderSide::Buy => ideal * (1.0 + slip),
            OrderSide::Sell => ideal * (1.0 - slip),
        };
        if !(price.is_finite() && price > 0.0) {
            return Err(ExecutionError::InvalidPrice { order: order.id, price });
        }
        let commission = price * order.quantity * self.commission_rate;
        if !commission.is_finite() {
            return Err(ExecutionError::InvalidCommission {
                order: order.id,
                commission,
            });
        }
        Ok(Fill {
            id: fill_id,
            order_id: order.id,
            timestamp: bar.timestamp,
            instrument: order.instrument.clone(),
            side: order.side,
            origin: order.origin,
            price,
            quantity: order.quantity,
            commission,
            ideal_price: ideal,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar() -> Bar {
        Bar::new("X", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 100.0, 105.0, 95.0, 102.0, 10_000.0)
    }

    fn order(side: OrderSide, order_type: OrderType, origin: OrderOrigin, qty: f64) -> Order {
        Order {
            id: OrderId(1),
            instrument: "X".into(),
            side,
            order_type,
            quantity: qty,
            origin,
            signal_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            created_bar: 0,
            stop_loss: Some(90.0),
            take_profit: Some(120.0),
        }
    }

    #[test]
    fn deferred_market_buy_fills_at_open_plus_slippage() {
        let exec = SimulatedExecution::new(0.001, SlippageModel::default(), FillTiming::NextOpen);
        let o = order(OrderSide::Buy, OrderType::Market, OrderOrigin::Signal, 100.0);
        assert!(exec.defers(&o));
        let fill = exec.execute(&o, &bar(), FillId(1)).unwrap();
        // slippage 0.1 * sqrt(0.01) = 0.01
        assert!((fill.price - 101.0).abs() < 1e-9);
        assert!((fill.commission - 101.0 * 100.0 * 0.001).abs() < 1e-9);
        assert_eq!(fill.ideal_price, 100.0);
        assert_eq!(fill.stop_loss, Some(90.0));
    }

    #[test]
    fn same_close_uses_close() {
        let exec = SimulatedExecution::new(0.0, SlippageModel::frictionless(), FillTiming::SameClose);
        let o = order(OrderSide::Sell, OrderType::Market, OrderOrigin::Signal, 1.0);
        assert!(!exec.defers(&o));
        assert_eq!(exec.execute(&o, &bar(), FillId(1)).unwrap().price, 102.0);
    }

    #[test]
    fn stop_sells_at_level_minus_slippage() {
        let exec = SimulatedExecution::new(0.0, SlippageModel::default(), FillTiming::NextOpen);
        let o = order(OrderSide::Sell, OrderType::Stop { trigger_price: 96.0 }, OrderOrigin::StopLoss, 100.0);
        assert!(!exec.defers(&o));
        let fill = exec.execute(&o, &bar(), FillId(2)).unwrap();
        assert!((fill.price - 96.0 * 0.99).abs() < 1e-9);
        assert!(fill.slippage_cost() > 0.0);
    }

    #[test]
    fn invalid_quantity_is_execution_error() {
        let exec = SimulatedExecution::from_config(&EngineConfig::default());
        let o = order(OrderSide::Buy, OrderType::Market, OrderOrigin::Signal, 0.0);
        assert!(matches!(
            exec.execute(&o, &bar(), FillId(1)),
            Err(ExecutionError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn non_positive_level_is_execution_error() {
        let exec = SimulatedExecution::from_config(&EngineConfig::default());
        let o = order(OrderSide::Sell, OrderType::Limit { limit_price: -1.0 }, OrderOrigin::TakeProfit, 1.0);
        assert!(matches!(
            exec.execute(&o, &bar(), FillId(1)),
            Err(ExecutionError::InvalidPrice { .. })
        ));
    }
}
