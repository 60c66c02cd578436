use std::collections::{HashMap, HashSet};

use chrono::Utc;
use ethers::types::Address;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use super::error::EscrowError;
use super::id_generator::IdGenerator;
use super::types::{NewTrade, Trade, TradeAction, TradeStatus};

/// Creation, authorization and transition rules for escrow trades.
///
/// `pending -> completed` and `pending -> cancelled` are the only transitions.
pub struct TradeLifecycle {
    ids: Box<dyn IdGenerator>,
}

impl TradeLifecycle {
    pub fn new(ids: impl IdGenerator + 'static) -> Self {
        Self { ids: Box::new(ids) }
    }

    /// Validate a creation request and stamp a new pending trade for `creator`.
    #[instrument(skip(self, request), fields(from = %request.from_token, to = %request.to_token))]
    pub fn open_trade(&self, creator: Option<Address>, request: NewTrade) -> Result<Trade, EscrowError> {
        let creator = creator.ok_or(EscrowError::Unauthorized)?;
        ensure_positive(request.from_amount)?;
        ensure_positive(request.to_amount)?;

        let trade = Trade {
            id: self.ids.next_trade_id(),
            from_token: request.from_token,
            to_token: request.to_token,
            from_amount: request.from_amount,
            to_amount: request.to_amount,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
            creator,
            counterparty: request.counterparty,
            escrow_address: self.ids.next_escrow_address(),
        };
        info!(
            trade_id = %trade.id,
            creator = ?trade.creator,
            counterparty = ?trade.counterparty,
            escrow_address = ?trade.escrow_address,
            "Escrow trade opened"
        );
        Ok(trade)
    }

    /// The actor must be the creator, or the counterparty when one is bound.
    /// An unbound counterparty does not open the trade to everyone.
    pub fn authorize(trade: &Trade, actor: Option<&Address>) -> Result<(), EscrowError> {
        let actor = actor.ok_or(EscrowError::Unauthorized)?;
        if *actor == trade.creator || trade.counterparty.as_ref() == Some(actor) {
            Ok(())
        } else {
            debug!(trade_id = %trade.id, actor = ?actor, "Actor is neither creator nor counterparty");
            Err(EscrowError::Unauthorized)
        }
    }

    /// Target status for `action`, or `InvalidTransition` if the trade is terminal
    pub fn check_transition(trade: &Trade, action: TradeAction) -> Result<TradeStatus, EscrowError> {
        match trade.status {
            TradeStatus::Pending => Ok(action.target_status()),
            status => Err(EscrowError::InvalidTransition {
                trade_id: trade.id.clone(),
                status,
                action,
            }),
        }
    }

    /// Whether `actor` may complete or cancel `trade` right now
    pub fn can_interact(trade: &Trade, actor: Option<&Address>) -> bool {
        trade.is_pending() && Self::authorize(trade, actor).is_ok()
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), EscrowError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(EscrowError::InvalidAmount(amount.to_string()))
    }
}

/// Trade ids with an unsettled complete or cancel, tracked per action.
/// A trade may have at most one outstanding action across both kinds.
#[derive(Debug, Default)]
pub struct InFlightActions {
    by_action: HashMap<TradeAction, HashSet<String>>,
}

impl InFlightActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&mut self, trade_id: &str, action: TradeAction) -> Result<(), EscrowError> {
        if let Some(in_flight) = self.processing(trade_id) {
            return Err(EscrowError::ActionInFlight {
                trade_id: trade_id.to_string(),
                in_flight,
            });
        }
        self.by_action
            .entry(action)
            .or_default()
            .insert(trade_id.to_string());
        Ok(())
    }

    /// Returns false if the action was not in flight
    pub fn finish(&mut self, trade_id: &str, action: TradeAction) -> bool {
        self.by_action
            .get_mut(&action)
            .is_some_and(|ids| ids.remove(trade_id))
    }

    pub fn processing(&self, trade_id: &str) -> Option<TradeAction> {
        self.by_action
            .iter()
            .find(|(_, ids)| ids.contains(trade_id))
            .map(|(action, _)| *action)
    }

    pub fn len(&self) -> usize {
        self.by_action.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::id_generator::SequentialIdGenerator;
    use rust_decimal::dec;

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn lifecycle() -> TradeLifecycle {
        TradeLifecycle::new(SequentialIdGenerator::new())
    }

    fn btc_for_eth(counterparty: Option<Address>) -> NewTrade {
        NewTrade::new("BTC", "ETH", dec!(1.5), dec!(20), counterparty)
    }

    #[test]
    fn test_open_trade_stamps_pending_trade_for_creator() {
        let trade = lifecycle().open_trade(Some(addr(1)), btc_for_eth(None)).unwrap();
        assert_eq!(trade.id, "trade-1");
        assert_eq!(trade.status, TradeStatus::Pending);
        assert_eq!(trade.creator, addr(1));
        assert!(trade.counterparty.is_none());
    }

    #[test]
    fn test_open_trade_requires_session() {
        assert_eq!(
            lifecycle().open_trade(None, btc_for_eth(None)),
            Err(EscrowError::Unauthorized)
        );
    }

    #[test]
    fn test_open_trade_rejects_non_positive_amounts() {
        let lifecycle = lifecycle();
        let zero_from = NewTrade::new("BTC", "ETH", dec!(0), dec!(20), None);
        let negative_to = NewTrade::new("BTC", "ETH", dec!(1), dec!(-3), None);
        assert!(matches!(
            lifecycle.open_trade(Some(addr(1)), zero_from),
            Err(EscrowError::InvalidAmount(_))
        ));
        assert!(matches!(
            lifecycle.open_trade(Some(addr(1)), negative_to),
            Err(EscrowError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_authorization_with_bound_counterparty() {
        let trade = lifecycle().open_trade(Some(addr(1)), btc_for_eth(Some(addr(2)))).unwrap();
        assert!(TradeLifecycle::authorize(&trade, Some(&addr(1))).is_ok());
        assert!(TradeLifecycle::authorize(&trade, Some(&addr(2))).is_ok());
        assert_eq!(
            TradeLifecycle::authorize(&trade, Some(&addr(3))),
            Err(EscrowError::Unauthorized)
        );
        assert_eq!(TradeLifecycle::authorize(&trade, None), Err(EscrowError::Unauthorized));
    }

    #[test]
    fn test_unbound_counterparty_only_allows_creator() {
        let trade = lifecycle().open_trade(Some(addr(1)), btc_for_eth(None)).unwrap();
        assert!(TradeLifecycle::can_interact(&trade, Some(&addr(1))));
        assert!(!TradeLifecycle::can_interact(&trade, Some(&addr(2))));
    }

    #[test]
    fn test_terminal_trades_reject_transitions() {
        let mut trade = lifecycle().open_trade(Some(addr(1)), btc_for_eth(None)).unwrap();
        assert_eq!(
            TradeLifecycle::check_transition(&trade, TradeAction::Complete),
            Ok(TradeStatus::Completed)
        );

        trade.status = TradeStatus::Completed;
        for action in [TradeAction::Complete, TradeAction::Cancel] {
            let err = TradeLifecycle::check_transition(&trade, action).unwrap_err();
            assert!(err.is_invalid_transition());
        }
        assert!(!TradeLifecycle::can_interact(&trade, Some(&addr(1))));
    }

    #[test]
    fn test_in_flight_guard_is_exclusive_per_trade() {
        let mut in_flight = InFlightActions::new();
        in_flight.try_begin("a", TradeAction::Complete).unwrap();

        assert_eq!(
            in_flight.try_begin("a", TradeAction::Cancel),
            Err(EscrowError::ActionInFlight {
                trade_id: "a".to_string(),
                in_flight: TradeAction::Complete,
            })
        );
        assert!(in_flight.try_begin("a", TradeAction::Complete).is_err());
        assert!(in_flight.try_begin("b", TradeAction::Cancel).is_ok());
        assert_eq!(in_flight.len(), 2);

        assert!(in_flight.finish("a", TradeAction::Complete));
        assert!(!in_flight.finish("a", TradeAction::Complete));
        assert_eq!(in_flight.processing("a"), None);
        assert_eq!(in_flight.processing("b"), Some(TradeAction::Cancel));
    }
}
