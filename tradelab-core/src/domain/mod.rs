//! Domain types for TradeLab

pub mod bar;
pub mod fill;
pub mod ids;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::{Bar, BarError};
pub use fill::Fill;
pub use ids::{ConfigHash, FillId, OrderId, SignalId};
pub use order::{Order, OrderOrigin, OrderSide, OrderType};
pub use portfolio::Portfolio;
pub use position::{Position, PositionSide};
pub use signal::{Signal, SignalDirection};
pub use trade::TradeRecord;

/// Symbol type alias
pub type Symbol = String;
