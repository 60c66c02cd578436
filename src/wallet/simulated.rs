use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ethers::types::Address;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::provider::{
    AccountsListener, ListenerId, ProviderError, WalletProvider, ETH_ACCOUNTS,
    ETH_REQUEST_ACCOUNTS, INTERNAL_ERROR, UNSUPPORTED_METHOD,
};

/// How the simulated user answers the next `eth_requestAccounts` prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Approve,
    Reject,
    Fail,
}

#[derive(Debug)]
struct WalletState {
    accounts: Vec<Address>,
    authorized: bool,
    prompt_response: PromptResponse,
    // eth_accounts answers with an internal error while set
    queries_fail: bool,
}

/// In-process stand-in for a browser wallet extension.
pub struct SimulatedProvider {
    state: Mutex<WalletState>,
    listeners: Mutex<BTreeMap<u64, AccountsListener>>,
    next_listener_id: AtomicU64,
    prompt_latency: Duration,
    query_latency: Duration,
}

impl SimulatedProvider {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            state: Mutex::new(WalletState {
                accounts,
                authorized: false,
                prompt_response: PromptResponse::Approve,
                queries_fail: false,
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(1),
            prompt_latency: Duration::ZERO,
            query_latency: Duration::ZERO,
        }
    }

    /// Wallet that has already authorized this site, as after a page reload
    pub fn authorized(accounts: Vec<Address>) -> Self {
        let provider = Self::new(accounts);
        provider.wallet().authorized = true;
        provider
    }

    pub fn with_prompt_latency(mut self, latency: Duration) -> Self {
        self.prompt_latency = latency;
        self
    }

    /// Delay between answering `eth_accounts` and delivering the answer
    pub fn with_query_latency(mut self, latency: Duration) -> Self {
        self.query_latency = latency;
        self
    }

    pub fn set_prompt_response(&self, response: PromptResponse) {
        self.wallet().prompt_response = response;
    }

    pub fn set_account_queries_failing(&self, failing: bool) {
        self.wallet().queries_fail = failing;
    }

    pub fn listener_count(&self) -> usize {
        self.registered().len()
    }

    /// User picks another account inside the extension
    #[instrument(skip(self))]
    pub fn switch_account(&self, account: Address) {
        let accounts = {
            let mut wallet = self.wallet();
            wallet.accounts.retain(|a| *a != account);
            wallet.accounts.insert(0, account);
            if !wallet.authorized {
                return;
            }
            wallet.accounts.clone()
        };
        self.emit_accounts_changed(&accounts);
    }

    /// User disconnects the site from within the extension
    #[instrument(skip(self))]
    pub fn revoke(&self) {
        self.wallet().authorized = false;
        self.emit_accounts_changed(&[]);
    }

    /// Push an arbitrary `accountsChanged` payload to every listener
    pub fn emit_accounts_changed(&self, accounts: &[Address]) {
        let listeners: Vec<AccountsListener> = self.registered().values().cloned().collect();
        debug!(listeners = listeners.len(), accounts = accounts.len(), "Emitting accountsChanged");
        for listener in listeners {
            listener(accounts);
        }
    }

    fn wallet(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registered(&self) -> MutexGuard<'_, BTreeMap<u64, AccountsListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accounts_value(accounts: &[Address]) -> Value {
        Value::Array(
            accounts
                .iter()
                .map(|a| Value::String(format!("{:#x}", a)))
                .collect(),
        )
    }
}

impl WalletProvider for SimulatedProvider {
    async fn request(&self, method: &str, _params: Vec<Value>) -> Result<Value, ProviderError> {
        match method {
            ETH_ACCOUNTS => {
                let answer = {
                    let wallet = self.wallet();
                    if wallet.queries_fail {
                        Err(ProviderError::new(INTERNAL_ERROR, "Internal JSON-RPC error."))
                    } else if wallet.authorized {
                        Ok(Self::accounts_value(&wallet.accounts))
                    } else {
                        Ok(Value::Array(vec![]))
                    }
                };
                if !self.query_latency.is_zero() {
                    tokio::time::sleep(self.query_latency).await;
                }
                answer
            }
            ETH_REQUEST_ACCOUNTS => {
                if !self.prompt_latency.is_zero() {
                    tokio::time::sleep(self.prompt_latency).await;
                }
                let mut wallet = self.wallet();
                match wallet.prompt_response {
                    PromptResponse::Approve => {
                        wallet.authorized = true;
                        info!(accounts = wallet.accounts.len(), "Simulated wallet approved connection");
                        Ok(Self::accounts_value(&wallet.accounts))
                    }
                    PromptResponse::Reject => Err(ProviderError::user_rejected()),
                    PromptResponse::Fail => Err(ProviderError::new(INTERNAL_ERROR, "Internal JSON-RPC error.")),
                }
            }
            other => Err(ProviderError::new(
                UNSUPPORTED_METHOD,
                format!("The requested method is not supported: {}", other),
            )),
        }
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.registered().insert(id, listener);
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.registered().remove(&id.0);
    }

    fn is_metamask(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn account(n: u8) -> Address {
        Address::from([n; 20])
    }

    #[tokio::test]
    async fn test_eth_accounts_is_empty_until_authorized() {
        let provider = SimulatedProvider::new(vec![account(1)]);
        let value = provider.request(ETH_ACCOUNTS, vec![]).await.unwrap();
        assert_eq!(value, Value::Array(vec![]));

        provider.request(ETH_REQUEST_ACCOUNTS, vec![]).await.unwrap();
        let value = provider.request(ETH_ACCOUNTS, vec![]).await.unwrap();
        let accounts: Vec<Address> = serde_json::from_value(value).unwrap();
        assert_eq!(accounts, vec![account(1)]);
    }

    #[tokio::test]
    async fn test_rejected_prompt_uses_user_rejection_code() {
        let provider = SimulatedProvider::new(vec![account(1)]);
        provider.set_prompt_response(PromptResponse::Reject);
        let err = provider.request(ETH_REQUEST_ACCOUNTS, vec![]).await.unwrap_err();
        assert!(err.is_user_rejection());
    }

    #[tokio::test]
    async fn test_unknown_method_is_unsupported() {
        let provider = SimulatedProvider::new(vec![]);
        let err = provider.request("eth_sendTransaction", vec![]).await.unwrap_err();
        assert_eq!(err.code, UNSUPPORTED_METHOD);
    }

    #[tokio::test]
    async fn test_failing_account_queries_return_internal_error() {
        let provider = SimulatedProvider::authorized(vec![account(1)]);
        provider.set_account_queries_failing(true);
        let err = provider.request(ETH_ACCOUNTS, vec![]).await.unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);

        provider.set_account_queries_failing(false);
        assert!(provider.request(ETH_ACCOUNTS, vec![]).await.is_ok());
    }

    #[test]
    fn test_switch_account_notifies_listeners_with_new_account_first() {
        let provider = SimulatedProvider::authorized(vec![account(1), account(2)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        provider.on_accounts_changed(Arc::new(move |accounts: &[Address]| {
            sink.lock().unwrap().push(accounts.to_vec());
        }));

        provider.switch_account(account(2));
        provider.revoke();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], vec![account(2), account(1)]);
        assert!(seen[1].is_empty());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let provider = SimulatedProvider::authorized(vec![account(1)]);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let id = provider.on_accounts_changed(Arc::new(move |_: &[Address]| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(provider.listener_count(), 1);
        provider.remove_listener(id);
        assert_eq!(provider.listener_count(), 0);
        provider.emit_accounts_changed(&[account(1)]);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
