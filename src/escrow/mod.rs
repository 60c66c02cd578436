pub mod error;
pub mod id_generator;
pub mod lifecycle;
pub mod trade_store;
pub mod types;

pub use error::EscrowError;
pub use lifecycle::{InFlightActions, TradeLifecycle};
pub use trade_store::TradeStore;
pub use types::{NewTrade, Trade, TradeAction, TradeStatus};
