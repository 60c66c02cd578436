use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::escrow::id_generator::{IdGenerator, RandomIdGenerator};
use crate::escrow::{
    EscrowError, InFlightActions, NewTrade, Trade, TradeAction, TradeLifecycle, TradeStatus,
    TradeStore,
};
use crate::wallet::{WalletProvider, WalletSession};

/// Simulated on-chain confirmation wait per action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationDelays {
    pub complete: Duration,
    pub cancel: Duration,
}

impl Default for ConfirmationDelays {
    fn default() -> Self {
        Self {
            complete: Duration::from_millis(2000),
            cancel: Duration::from_millis(1500),
        }
    }
}

impl ConfirmationDelays {
    pub fn for_action(&self, action: TradeAction) -> Duration {
        match action {
            TradeAction::Complete => self.complete,
            TradeAction::Cancel => self.cancel,
        }
    }
}

/// One row of the trade list as the UI renders it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: Trade,
    /// Complete or cancel awaiting confirmation
    pub processing: Option<TradeAction>,
    /// The connected identity may act on this trade now
    pub can_interact: bool,
}

#[derive(Debug, Default)]
struct TradeBook {
    store: TradeStore,
    in_flight: InFlightActions,
}

/// Handle to a started complete/cancel. Resolves to the applied status, or
/// `None` when the settlement turned into a no-op.
#[derive(Debug)]
pub struct Settlement {
    pub trade_id: String,
    pub action: TradeAction,
    receiver: oneshot::Receiver<Option<TradeStatus>>,
}

impl Settlement {
    pub async fn settled(self) -> Option<TradeStatus> {
        self.receiver.await.ok().flatten()
    }
}

/// Wires the wallet session identity into trade creation and authorization,
/// and owns the deferred confirmation tasks.
pub struct EscrowDesk<P: WalletProvider> {
    session: WalletSession<P>,
    lifecycle: TradeLifecycle,
    book: Arc<RwLock<TradeBook>>,
    delays: ConfirmationDelays,
    settlements: Mutex<JoinSet<()>>,
}

impl<P: WalletProvider> EscrowDesk<P> {
    pub fn new(session: WalletSession<P>, ids: impl IdGenerator + 'static, delays: ConfirmationDelays) -> Self {
        Self {
            session,
            lifecycle: TradeLifecycle::new(ids),
            book: Arc::new(RwLock::new(TradeBook::default())),
            delays,
            settlements: Mutex::new(JoinSet::new()),
        }
    }

    pub fn from_config(provider: Option<Arc<P>>, config: &Config) -> Self {
        Self::new(WalletSession::new(provider), RandomIdGenerator, config.delays)
    }

    pub fn session(&self) -> &WalletSession<P> {
        &self.session
    }

    pub fn delays(&self) -> ConfirmationDelays {
        self.delays
    }

    /// Open a new pending trade for the connected identity
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: NewTrade) -> Result<Trade, EscrowError> {
        let trade = self.lifecycle.open_trade(self.session.identity(), request)?;
        self.book.write().await.store.append(trade.clone());
        Ok(trade)
    }

    pub async fn complete(&self, trade_id: &str) -> Result<Settlement, EscrowError> {
        self.begin(trade_id, TradeAction::Complete).await
    }

    pub async fn cancel(&self, trade_id: &str) -> Result<Settlement, EscrowError> {
        self.begin(trade_id, TradeAction::Cancel).await
    }

    /// Trades newest first, annotated for the connected identity
    pub async fn trades(&self) -> Vec<TradeView> {
        let actor = self.session.identity();
        let book = self.book.read().await;
        book.store
            .trades()
            .iter()
            .map(|trade| {
                let processing = book.in_flight.processing(&trade.id);
                TradeView {
                    trade: trade.clone(),
                    processing,
                    can_interact: processing.is_none()
                        && TradeLifecycle::can_interact(trade, actor.as_ref()),
                }
            })
            .collect()
    }

    pub async fn trade(&self, trade_id: &str) -> Option<Trade> {
        self.book.read().await.store.get(trade_id).cloned()
    }

    pub async fn trade_count(&self) -> usize {
        self.book.read().await.store.len()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.book.read().await.in_flight.len()
    }

    #[instrument(skip(self), fields(action = %action))]
    async fn begin(&self, trade_id: &str, action: TradeAction) -> Result<Settlement, EscrowError> {
        let actor = self.session.identity().ok_or(EscrowError::Unauthorized)?;
        {
            let mut book = self.book.write().await;
            let trade = book
                .store
                .get(trade_id)
                .ok_or_else(|| EscrowError::TradeNotFound(trade_id.to_string()))?;
            TradeLifecycle::authorize(trade, Some(&actor))?;
            TradeLifecycle::check_transition(trade, action)?;
            book.in_flight.try_begin(trade_id, action)?;
        }

        // The wait is measured from the call, not from the task's first poll
        let delay = self.delays.for_action(action);
        let deadline = tokio::time::Instant::now() + delay;
        let (sender, receiver) = oneshot::channel();
        let book = Arc::downgrade(&self.book);
        let id = trade_id.to_string();
        {
            let mut settlements = self.lock_settlements();
            while settlements.try_join_next().is_some() {}
            settlements.spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let applied = match book.upgrade() {
                    Some(book) => settle(&book, &id, action).await,
                    None => {
                        debug!(trade_id = %id, "Trade book released before confirmation");
                        None
                    }
                };
                // Fails only when the caller dropped its Settlement handle
                let _ = sender.send(applied);
            });
        }
        info!(trade_id = %trade_id, actor = ?actor, delay = ?delay, "Awaiting simulated confirmation");

        Ok(Settlement {
            trade_id: trade_id.to_string(),
            action,
            receiver,
        })
    }

    fn lock_settlements(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.settlements.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: WalletProvider> Drop for EscrowDesk<P> {
    fn drop(&mut self) {
        let mut settlements = self.lock_settlements();
        if !settlements.is_empty() {
            debug!(outstanding = settlements.len(), "Aborting unsettled confirmations");
            settlements.abort_all();
        }
    }
}

async fn settle(book: &RwLock<TradeBook>, trade_id: &str, action: TradeAction) -> Option<TradeStatus> {
    let mut book = book.write().await;
    book.in_flight.finish(trade_id, action);
    let Some(trade) = book.store.get(trade_id) else {
        debug!(trade_id = %trade_id, "Trade disappeared before confirmation");
        return None;
    };
    match TradeLifecycle::check_transition(trade, action) {
        Ok(status) => {
            book.store.set_status(trade_id, status);
            info!(trade_id = %trade_id, status = %status, "Trade settled");
            Some(status)
        }
        Err(err) => {
            warn!(error = %err, "Confirmation arrived for a settled trade");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::id_generator::SequentialIdGenerator;
    use crate::wallet::simulated::SimulatedProvider;
    use ethers::types::Address;
    use rust_decimal::dec;

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    async fn connected_desk(accounts: Vec<Address>) -> (Arc<SimulatedProvider>, EscrowDesk<SimulatedProvider>) {
        let provider = Arc::new(SimulatedProvider::new(accounts));
        let session = WalletSession::new(Some(provider.clone()));
        session.connect().await.unwrap();
        let desk = EscrowDesk::new(session, SequentialIdGenerator::new(), ConfirmationDelays::default());
        (provider, desk)
    }

    #[tokio::test]
    async fn test_create_requires_session() {
        let provider = Arc::new(SimulatedProvider::new(vec![addr(1)]));
        let desk = EscrowDesk::new(
            WalletSession::new(Some(provider)),
            SequentialIdGenerator::new(),
            ConfirmationDelays::default(),
        );
        let request = NewTrade::new("BTC", "ETH", dec!(1), dec!(2), None);
        assert_eq!(desk.create(request).await, Err(EscrowError::Unauthorized));
        assert_eq!(desk.trade_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_amount_leaves_store_unchanged() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        desk.create(NewTrade::new("BTC", "ETH", dec!(1), dec!(2), None)).await.unwrap();

        let zero_from = NewTrade::new("BTC", "ETH", dec!(0), dec!(2), None);
        let negative_to = NewTrade::new("BTC", "ETH", dec!(1), dec!(-2), None);
        assert!(matches!(desk.create(zero_from).await, Err(EscrowError::InvalidAmount(_))));
        assert!(matches!(desk.create(negative_to).await, Err(EscrowError::InvalidAmount(_))));
        assert_eq!(desk.trade_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_trade_id() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        assert_eq!(
            desk.complete("nope").await.err(),
            Some(EscrowError::TradeNotFound("nope".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_view_shows_processing_state() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        let trade = desk.create(NewTrade::new("SOL", "USDC", dec!(10), dec!(987.6), None)).await.unwrap();

        let settlement = desk.cancel(&trade.id).await.unwrap();
        let views = desk.trades().await;
        assert_eq!(views[0].processing, Some(TradeAction::Cancel));
        assert!(!views[0].can_interact);
        assert_eq!(views[0].trade.status, TradeStatus::Pending);

        assert_eq!(settlement.settled().await, Some(TradeStatus::Cancelled));
        let views = desk.trades().await;
        assert_eq!(views[0].processing, None);
        assert_eq!(views[0].trade.status, TradeStatus::Cancelled);
        assert_eq!(desk.in_flight_count().await, 0);
    }

    async fn run_pending_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_applies_once_delay_elapses() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        let trade = desk.create(NewTrade::new("BTC", "ETH", dec!(1), dec!(16), None)).await.unwrap();
        let _settlement = desk.cancel(&trade.id).await.unwrap();

        tokio::time::advance(Duration::from_millis(1499)).await;
        run_pending_tasks().await;
        assert_eq!(desk.trade(&trade.id).await.unwrap().status, TradeStatus::Pending);

        tokio::time::advance(Duration::from_millis(1)).await;
        run_pending_tasks().await;
        assert_eq!(desk.trade(&trade.id).await.unwrap().status, TradeStatus::Cancelled);
        assert_eq!(desk.in_flight_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_on_different_trades_are_independent() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        let first = desk.create(NewTrade::new("BTC", "ETH", dec!(1), dec!(16), None)).await.unwrap();
        let second = desk.create(NewTrade::new("DOT", "LINK", dec!(5), dec!(2.7), None)).await.unwrap();

        let completing = desk.complete(&first.id).await.unwrap();
        let cancelling = desk.cancel(&second.id).await.unwrap();
        assert_eq!(desk.in_flight_count().await, 2);

        assert_eq!(cancelling.settled().await, Some(TradeStatus::Cancelled));
        assert_eq!(completing.settled().await, Some(TradeStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_desk_mid_delay_is_noop() {
        let (_, desk) = connected_desk(vec![addr(1)]).await;
        let trade = desk.create(NewTrade::new("BTC", "ETH", dec!(1), dec!(16), None)).await.unwrap();
        let settlement = desk.complete(&trade.id).await.unwrap();

        drop(desk);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(settlement.settled().await, None);
    }

    #[tokio::test]
    async fn test_provider_switch_changes_acting_identity() {
        let (provider, desk) = connected_desk(vec![addr(1), addr(2)]).await;
        let trade = desk.create(NewTrade::new("ADA", "ETH", dec!(100), dec!(0.02), None)).await.unwrap();
        assert!(desk.trades().await[0].can_interact);

        provider.switch_account(addr(2));
        assert!(!desk.trades().await[0].can_interact);
        assert_eq!(desk.cancel(&trade.id).await.err(), Some(EscrowError::Unauthorized));
    }
}
