use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use ethers::types::Address;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Returns already-authorized accounts without prompting the user
pub const ETH_ACCOUNTS: &str = "eth_accounts";
/// Prompts the user and returns the accounts they approved
pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";

// EIP-1193 provider error codes
pub const USER_REJECTED_REQUEST: i64 = 4001;
pub const UNSUPPORTED_METHOD: i64 = 4200;
pub const INTERNAL_ERROR: i64 = -32603;

/// Error returned by an injected wallet for a failed `request`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_REQUEST, "User rejected the request.")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_REQUEST
    }
}

/// Callback invoked with the full account list on every `accountsChanged` event
pub type AccountsListener = Arc<dyn Fn(&[Address]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// An injected browser wallet (MetaMask-style), reduced to the calls the desk needs.
pub trait WalletProvider: Send + Sync + 'static {
    /// Issue a JSON-RPC style request, e.g. `eth_accounts`
    fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value, ProviderError>> + Send;

    /// Register an `accountsChanged` listener
    fn on_accounts_changed(&self, listener: AccountsListener) -> ListenerId;

    /// Unregister a listener previously returned by `on_accounts_changed`
    fn remove_listener(&self, id: ListenerId);

    fn is_metamask(&self) -> bool {
        false
    }
}

/// Holds an `accountsChanged` registration and releases it on drop.
pub struct ListenerGuard<P: WalletProvider> {
    provider: Weak<P>,
    id: ListenerId,
}

impl<P: WalletProvider> ListenerGuard<P> {
    pub fn register(provider: &Arc<P>, listener: AccountsListener) -> Self {
        let id = provider.on_accounts_changed(listener);
        debug!(listener = %id, "Registered accountsChanged listener");
        Self {
            provider: Arc::downgrade(provider),
            id,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl<P: WalletProvider> Drop for ListenerGuard<P> {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.remove_listener(self.id);
            debug!(listener = %self.id, "Removed accountsChanged listener");
        }
    }
}
