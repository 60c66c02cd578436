pub mod provider;
pub mod session;
pub mod simulated;

pub use provider::{ProviderError, WalletProvider};
pub use session::{SessionSnapshot, WalletError, WalletSession};
