//! Portfolio side of the event loop.
//!
//! Turns signals and protective-level breaches into orders, and applies fills
//! to cash, positions and the trade log. Fills are the only thing that mutate
//! positions.

use tracing::{debug, warn};

use crate::domain::{
    Bar, Fill, Order, OrderOrigin, OrderSide, OrderType, Portfolio, Position, PositionSide, Signal,
    SignalDirection, TradeRecord,
};
use crate::risk::{size_entry, RiskConfig, SizingDecision};

use super::state::{EngineConfig, IdGen};

/// Why a signal produced no order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IgnoreReason {
    /// An order for the instrument is already in flight.
    PendingOrder,
    /// Already positioned in the signalled direction.
    SameDirection,
    /// `Close` with nothing open.
    NothingToClose,
    /// The risk manager could not place a stop (e.g. ATR unavailable).
    NoProtectiveLevels,
    /// The sizing funnel produced no tradable quantity.
    Sizing(SizingDecision),
}

impl IgnoreReason {
    /// Entry rejections, as opposed to signals that were simply redundant.
    pub fn is_rejected_entry(&self) -> bool {
        matches!(self, IgnoreReason::NoProtectiveLevels | IgnoreReason::Sizing(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Order(Order),
    Ignored(IgnoreReason),
}

/// Decide what `signal` means for the portfolio on bar `bar_index`.
///
/// With a position open, an opposite or `Close` signal flattens it; with none,
/// `Long`/`Short` opens one sized by the risk manager and the exposure cap.
/// The instrument is marked pending when an order is returned.
pub fn order_for_signal(
    portfolio: &mut Portfolio,
    signal: &Signal,
    bar: &Bar,
    bar_index: usize,
    risk: &RiskConfig,
    config: &EngineConfig,
    ids: &mut IdGen,
) -> SignalOutcome {
    let instrument = signal.instrument.as_str();
    if portfolio.has_pending(instrument) {
        return SignalOutcome::Ignored(IgnoreReason::PendingOrder);
    }

    let order = if let Some(position) = portfolio.get_position(instrument) {
        let closes = match signal.direction {
            SignalDirection::Close => true,
            SignalDirection::Long => position.side == PositionSide::Short,
            SignalDirection::Short => position.side == PositionSide::Long,
        };
        if !closes {
            return SignalOutcome::Ignored(IgnoreReason::SameDirection);
        }
        Order {
            id: ids.next_order(),
            instrument: instrument.to_string(),
            side: position.side.exit_side(),
            order_type: OrderType::Market,
            quantity: position.quantity,
            origin: OrderOrigin::Signal,
            signal_id: Some(signal.id),
            created_at: signal.timestamp,
            created_bar: bar_index,
            stop_loss: None,
            take_profit: None,
        }
    } else {
        let Some(side) = OrderSide::for_entry(signal.direction) else {
            return SignalOutcome::Ignored(IgnoreReason::NothingToClose);
        };
        let position_side = PositionSide::from_entry_side(side);
        let Some(levels) = risk.levels(signal.price, position_side, bar) else {
            return SignalOutcome::Ignored(IgnoreReason::NoProtectiveLevels);
        };
        let capital = portfolio.available_capital();
        let quantity = match size_entry(
            capital,
            capital,
            signal.price,
            &levels,
            config.max_exposure,
            config.lot_step,
        ) {
            SizingDecision::Accept { quantity, .. } => quantity,
            other => return SignalOutcome::Ignored(IgnoreReason::Sizing(other)),
        };
        Order {
            id: ids.next_order(),
            instrument: instrument.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            origin: OrderOrigin::Signal,
            signal_id: Some(signal.id),
            created_at: signal.timestamp,
            created_bar: bar_index,
            stop_loss: Some(levels.stop_loss),
            take_profit: Some(levels.take_profit),
        }
    };

    portfolio.pending.insert(instrument.to_string());
    SignalOutcome::Order(order)
}

/// Exit order for a position whose stop-loss or take-profit this bar touched.
///
/// The stop-loss wins when both are inside the bar's range.
pub fn protective_order(position: &Position, bar: &Bar, bar_index: usize, ids: &mut IdGen) -> Option<Order> {
    let (order_type, origin) = if position.stop_hit(bar.high, bar.low) {
        let trigger_price = position.stop_loss?;
        (OrderType::Stop { trigger_price }, OrderOrigin::StopLoss)
    } else if position.target_hit(bar.high, bar.low) {
        let limit_price = position.take_profit?;
        (OrderType::Limit { limit_price }, OrderOrigin::TakeProfit)
    } else {
        return None;
    };
    Some(Order {
        id: ids.next_order(),
        instrument: position.instrument.clone(),
        side: position.side.exit_side(),
        order_type,
        quantity: position.quantity,
        origin,
        signal_id: None,
        created_at: bar.timestamp,
        created_bar: bar_index,
        stop_loss: None,
        take_profit: None,
    })
}

/// Market order flattening `position` at the final close.
pub fn end_of_data_order(position: &Position, bar: &Bar, bar_index: usize, ids: &mut IdGen) -> Order {
    Order {
        id: ids.next_order(),
        instrument: position.instrument.clone(),
        side: position.side.exit_side(),
        order_type: OrderType::Market,
        quantity: position.quantity,
        origin: OrderOrigin::EndOfData,
        signal_id: None,
        created_at: bar.timestamp,
        created_bar: bar_index,
        stop_loss: None,
        take_profit: None,
    }
}

/// Apply one fill. Returns the closed trade when the fill flattens a position.
pub fn apply_fill(portfolio: &mut Portfolio, fill: &Fill, bar_index: usize) -> Option<TradeRecord> {
    portfolio.total_commission += fill.commission;
    portfolio.total_slippage += fill.slippage_cost();
    portfolio.pending.remove(&fill.instrument);

    match portfolio.positions.remove(&fill.instrument) {
        Some(position) if position.side.exit_side() == fill.side => {
            Some(close_position(portfolio, position, fill, bar_index))
        }
        Some(position) => {
            warn!(
                instrument = %fill.instrument,
                fill = %fill.id,
                "fill on the entry side of an open position ignored"
            );
            portfolio.positions.insert(fill.instrument.clone(), position);
            None
        }
        None => {
            open_position(portfolio, fill, bar_index);
            None
        }
    }
}

fn open_position(portfolio: &mut Portfolio, fill: &Fill, bar_index: usize) {
    debug!(
        instrument = %fill.instrument,
        side = ?fill.side,
        qty = fill.quantity,
        price = fill.price,
        "position opened"
    );
    portfolio.positions.insert(
        fill.instrument.clone(),
        Position {
            instrument: fill.instrument.clone(),
            side: PositionSide::from_entry_side(fill.side),
            quantity: fill.quantity,
            entry_price: fill.price,
            entry_timestamp: fill.timestamp,
            entry_bar: bar_index,
            entry_commission: fill.commission,
            stop_loss: fill.stop_loss,
            take_profit: fill.take_profit,
        },
    );
}

fn close_position(portfolio: &mut Portfolio, position: Position, fill: &Fill, bar_index: usize) -> TradeRecord {
    let gross = position.side.sign() * (fill.price - position.entry_price) * position.quantity;
    let commission = position.entry_commission + fill.commission;
    let net = gross - commission;
    portfolio.cash += net;
    portfolio.realized_pnl += net;

    let trade = TradeRecord {
        instrument: position.instrument,
        side: position.side,
        entry_bar: position.entry_bar,
        entry_timestamp: position.entry_timestamp,
        entry_price: position.entry_price,
        exit_bar: bar_index,
        exit_timestamp: fill.timestamp,
        exit_price: fill.price,
        exit_reason: fill.origin,
        quantity: position.quantity,
        gross_pnl: gross,
        commission,
        net_pnl: net,
    };
    debug!(
        instrument = %trade.instrument,
        reason = ?trade.exit_reason,
        net = trade.net_pnl,
        "position closed"
    );
    portfolio.trades.push(trade.clone());
    trade
}
