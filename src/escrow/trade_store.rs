use tracing::debug;

use super::types::{Trade, TradeStatus};

/// In-memory trade book, newest first. Entries are never removed.
#[derive(Debug, Default, Clone)]
pub struct TradeStore {
    trades: Vec<Trade>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All trades in creation order, newest first
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn get(&self, id: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn append(&mut self, trade: Trade) {
        debug!(trade_id = %trade.id, "Appending trade");
        self.trades.insert(0, trade);
    }

    /// Overwrite the status of a trade. Unknown ids are ignored so that stale
    /// references cannot fail.
    pub fn set_status(&mut self, id: &str, status: TradeStatus) {
        match self.trades.iter_mut().find(|t| t.id == id) {
            Some(trade) => trade.status = status,
            None => debug!(trade_id = %id, status = %status, "Ignoring status update for unknown trade"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ethers::types::Address;
    use rust_decimal::dec;

    fn trade(id: &str) -> Trade {
        Trade {
            id: id.to_string(),
            from_token: "BTC".to_string(),
            to_token: "ETH".to_string(),
            from_amount: dec!(1),
            to_amount: dec!(16),
            status: TradeStatus::Pending,
            created_at: Utc::now(),
            creator: Address::from([1; 20]),
            counterparty: None,
            escrow_address: Address::from([9; 20]),
        }
    }

    #[test]
    fn test_newest_first_and_stable_after_mutation() {
        let mut store = TradeStore::new();
        store.append(trade("a"));
        store.append(trade("b"));
        store.append(trade("c"));
        store.set_status("b", TradeStatus::Completed);

        let ids: Vec<&str> = store.trades().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(store.get("b").map(|t| t.status), Some(TradeStatus::Completed));
    }

    #[test]
    fn test_set_status_on_unknown_id_is_noop() {
        let mut store = TradeStore::new();
        store.append(trade("a"));
        let before = store.clone();
        store.set_status("missing", TradeStatus::Cancelled);
        assert_eq!(store.trades(), before.trades());
        assert_eq!(store.len(), 1);
    }
}
