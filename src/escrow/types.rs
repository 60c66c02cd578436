use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Completed => "completed",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state-changing command on a pending trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Complete,
    Cancel,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Complete => "complete",
            TradeAction::Cancel => "cancel",
        }
    }

    pub fn target_status(&self) -> TradeStatus {
        match self {
            TradeAction::Complete => TradeStatus::Completed,
            TradeAction::Cancel => TradeStatus::Cancelled,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One escrowed swap proposal. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub creator: Address,
    pub counterparty: Option<Address>,
    pub escrow_address: Address,
}

impl Trade {
    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::Pending
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {} {} ({}) escrow {} creator {}",
            self.id,
            self.from_amount,
            self.from_token,
            self.to_amount,
            self.to_token,
            self.status,
            format_address(&self.escrow_address),
            format_address(&self.creator),
        )
    }
}

/// Creation request, before ids, timestamps and the creator are stamped on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub counterparty: Option<Address>,
}

impl NewTrade {
    pub fn new(
        from_token: impl Into<String>,
        to_token: impl Into<String>,
        from_amount: Decimal,
        to_amount: Decimal,
        counterparty: Option<Address>,
    ) -> Self {
        Self {
            from_token: from_token.into(),
            to_token: to_token.into(),
            from_amount,
            to_amount,
            counterparty,
        }
    }

    /// Build a request from raw form input. An empty counterparty field means
    /// the trade is open to a future counterparty.
    pub fn from_form(
        from_token: &str,
        to_token: &str,
        from_amount: &str,
        to_amount: &str,
        counterparty: &str,
    ) -> Result<Self, EscrowError> {
        let counterparty = match counterparty.trim() {
            "" => None,
            raw => Some(
                Address::from_str(raw).map_err(|_| EscrowError::InvalidAddress(raw.to_string()))?,
            ),
        };
        Ok(Self::new(
            from_token,
            to_token,
            parse_amount(from_amount)?,
            parse_amount(to_amount)?,
            counterparty,
        ))
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, EscrowError> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| EscrowError::InvalidAmount(raw.to_string()))
}

/// Shorten an address to `0x1234...abcd`
pub fn format_address(address: &Address) -> String {
    let full = format!("{:#x}", address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
