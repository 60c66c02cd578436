use thiserror::Error;

use super::types::{TradeAction, TradeStatus};

/// Rejections from trade creation and the trade lifecycle. All are recoverable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    #[error("Unauthorized: connect the trade creator or counterparty wallet")]
    Unauthorized,

    #[error("Invalid amount: {0:?} (must be a positive number)")]
    InvalidAmount(String),

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Trade {trade_id} is {status}, cannot {action}")]
    InvalidTransition {
        trade_id: String,
        status: TradeStatus,
        action: TradeAction,
    },

    #[error("Trade {trade_id} already has a {in_flight} in progress")]
    ActionInFlight {
        trade_id: String,
        in_flight: TradeAction,
    },

    #[error("Trade not found: {0}")]
    TradeNotFound(String),
}

impl EscrowError {
    /// Whether the rejection is a transition no-op (terminal or busy trade)
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            EscrowError::InvalidTransition { .. } | EscrowError::ActionInFlight { .. }
        )
    }
}
