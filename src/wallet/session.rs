use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ethers::types::Address;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::provider::{
    AccountsListener, ListenerGuard, ListenerId, ProviderError, WalletProvider, ETH_ACCOUNTS,
    ETH_REQUEST_ACCOUNTS,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("MetaMask is not installed. Please install MetaMask to continue.")]
    ProviderMissing,

    #[error("Connection rejected by user")]
    ConnectionRejected,

    #[error("Failed to connect wallet")]
    ConnectionFailed,

    /// A newer connect attempt (or a disconnect) started before this one settled
    #[error("Connection attempt superseded")]
    Superseded,
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        if err.is_user_rejection() {
            WalletError::ConnectionRejected
        } else {
            WalletError::ConnectionFailed
        }
    }
}

/// Read model of the wallet connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Address>,
    pub connecting: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Address>,
    connecting: bool,
    last_error: Option<String>,
    // Only the attempt holding the latest number may settle the session
    connect_attempt: u64,
    // Bumped on every identity write
    revision: u64,
}

impl SessionState {
    fn set_identity(&mut self, identity: Option<Address>) {
        self.identity = identity;
        self.revision += 1;
    }
}

/// Tracks the connection to a single injected wallet provider.
///
/// Holds the only `accountsChanged` registration for its provider; the
/// registration is released when the session is dropped.
pub struct WalletSession<P: WalletProvider> {
    provider: Option<Arc<P>>,
    state: Arc<Mutex<SessionState>>,
    listener: Option<ListenerGuard<P>>,
}

impl<P: WalletProvider> WalletSession<P> {
    /// Build a session and subscribe to provider account changes.
    /// `None` models a browser without a wallet extension.
    pub fn new(provider: Option<Arc<P>>) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));
        let listener = provider.as_ref().map(|provider| {
            let weak_state = Arc::downgrade(&state);
            let callback: AccountsListener = Arc::new(move |accounts: &[Address]| {
                Self::handle_accounts_changed(&weak_state, accounts);
            });
            ListenerGuard::register(provider, callback)
        });
        Self {
            provider,
            state,
            listener,
        }
    }

    pub fn is_provider_installed(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_metamask(&self) -> bool {
        self.provider.as_ref().is_some_and(|p| p.is_metamask())
    }

    pub fn identity(&self) -> Option<Address> {
        self.lock_state().identity
    }

    pub fn is_connecting(&self) -> bool {
        self.lock_state().connecting
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            identity: state.identity,
            connecting: state.connecting,
            last_error: state.last_error.clone(),
        }
    }

    /// Prompt the wallet for account access and adopt the first account.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<Option<Address>, WalletError> {
        let provider = self.provider.as_ref().ok_or(WalletError::ProviderMissing)?;

        let attempt = {
            let mut state = self.lock_state();
            state.connect_attempt += 1;
            state.connecting = true;
            state.last_error = None;
            state.connect_attempt
        };
        debug!(attempt, "Requesting wallet accounts");

        let outcome = match provider.request(ETH_REQUEST_ACCOUNTS, vec![]).await {
            Ok(value) => parse_accounts(value),
            Err(err) => {
                warn!(code = err.code, message = %err.message, "Wallet connection request failed");
                Err(WalletError::from(err))
            }
        };

        let mut state = self.lock_state();
        if state.connect_attempt != attempt {
            debug!(attempt, latest = state.connect_attempt, "Discarding superseded connect attempt");
            return Err(WalletError::Superseded);
        }
        state.connecting = false;

        match outcome {
            Ok(accounts) => {
                if let Some(first) = accounts.first() {
                    state.set_identity(Some(*first));
                    info!(identity = ?first, "Wallet connected");
                } else {
                    info!("Wallet returned no accounts");
                }
                Ok(state.identity)
            }
            Err(err) => {
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Forget the local identity. Provider-side authorization is left untouched.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        let mut state = self.lock_state();
        state.set_identity(None);
        state.last_error = None;
        if state.connecting {
            state.connect_attempt += 1;
            state.connecting = false;
        }
        info!("Wallet disconnected");
    }

    /// Best-effort silent restore of an already-authorized account at startup.
    ///
    /// The answer is dropped if a connect, disconnect or account change
    /// touched the session while the query was outstanding.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) {
        let Some(provider) = self.provider.as_ref() else {
            return;
        };
        let (attempt, revision) = {
            let state = self.lock_state();
            (state.connect_attempt, state.revision)
        };
        let accounts = match provider.request(ETH_ACCOUNTS, vec![]).await {
            Ok(value) => parse_accounts(value),
            Err(err) => Err(WalletError::from(err)),
        };
        match accounts {
            Ok(accounts) => {
                let Some(first) = accounts.first() else {
                    return;
                };
                let mut state = self.lock_state();
                if state.connect_attempt != attempt
                    || state.revision != revision
                    || state.identity.is_some()
                {
                    debug!(restored = ?first, "Session changed during restore, keeping current identity");
                    return;
                }
                state.set_identity(Some(*first));
                info!(identity = ?first, "Restored wallet session");
            }
            Err(err) => warn!(error = %err, "Error checking wallet connection"),
        }
    }

    fn handle_accounts_changed(state: &Weak<Mutex<SessionState>>, accounts: &[Address]) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.set_identity(accounts.first().copied());
        debug!(identity = ?state.identity, "Provider reported account change");
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listener_id(&self) -> Option<ListenerId> {
        self.listener.as_ref().map(|l| l.id())
    }
}

fn parse_accounts(value: Value) -> Result<Vec<Address>, WalletError> {
    serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "Wallet returned malformed account list");
        WalletError::ConnectionFailed
    })
}
