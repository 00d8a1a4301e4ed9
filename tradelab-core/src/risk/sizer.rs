//! Entry sizing funnel.
//!
//! 1. Risk quantity: capital * risk% / |entry - stop|.
//! 2. Exposure quantity: capital * max_exposure / entry.
//! 3. Take the smaller, round down to the lot step.
//! 4. Reject if the notional exceeds available cash.

use super::ProtectiveLevels;

/// Stop distances at or below this are treated as "no risk budget".
const MIN_STOP_DISTANCE: f64 = 1e-9;

/// Which constraint set the final quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingLimit {
    Risk,
    Exposure,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingDecision {
    Accept { quantity: f64, limit: SizingLimit },
    TooSmall,
    InsufficientCapital { required: f64, available: f64 },
}

/// Size an entry at `entry` with the given protective levels.
pub fn size_entry(
    capital: f64,
    available: f64,
    entry: f64,
    levels: &ProtectiveLevels,
    max_exposure: f64,
    lot_step: f64,
) -> SizingDecision {
    if entry <= 0.0 || capital <= 0.0 {
        return SizingDecision::TooSmall;
    }
    let stop_distance = (entry - levels.stop_loss).abs();
    let from_risk = if stop_distance <= MIN_STOP_DISTANCE {
        0.0
    } else {
        capital * levels.risk_percent / 100.0 / stop_distance
    };
    let from_exposure = capital * max_exposure / entry;

    let (raw, limit) = if from_risk < from_exposure {
        (from_risk, SizingLimit::Risk)
    } else {
        (from_exposure, SizingLimit::Exposure)
    };
    let quantity = round_down(raw, lot_step);
    if quantity <= 0.0 {
        return SizingDecision::TooSmall;
    }
    let required = quantity * entry;
    if required > available {
        return SizingDecision::InsufficientCapital { required, available };
    }
    SizingDecision::Accept { quantity, limit }
}

fn round_down(quantity: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return quantity;
    }
    // Small epsilon so 3.0 / 0.1 style ratios don't land one step short.
    (quantity / step + 1e-9).floor() * step
}
