use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use ethers::types::Address;
use eyre::{eyre, Result, WrapErr};

use crate::desk::ConfirmationDelays;

// Accounts exposed by the simulated wallet when SIMULATED_ACCOUNTS is unset
const DEFAULT_SIMULATED_ACCOUNTS: [&str; 2] = [
    "0x8ba1f109551bd432803012645ac136ddd64dba72",
    "0xab5801a7d398351b8be11c439e05c5b3259aec9b",
];

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub delays: ConfirmationDelays,
    pub token_list_path: Option<PathBuf>,
    pub simulated_accounts: Vec<Address>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let defaults = ConfirmationDelays::default();
        let delays = ConfirmationDelays {
            complete: duration_ms("COMPLETE_DELAY_MS", defaults.complete)?,
            cancel: duration_ms("CANCEL_DELAY_MS", defaults.cancel)?,
        };

        let token_list_path = env::var("TOKEN_LIST_PATH").ok().map(PathBuf::from);

        let simulated_accounts = match env::var("SIMULATED_ACCOUNTS") {
            Ok(raw) => parse_accounts(&raw).wrap_err("Invalid SIMULATED_ACCOUNTS")?,
            Err(_) => parse_accounts(&DEFAULT_SIMULATED_ACCOUNTS.join(","))?,
        };

        Ok(Config {
            delays,
            token_list_path,
            simulated_accounts,
        })
    }
}

fn duration_ms(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => {
            let millis = raw
                .trim()
                .parse::<u64>()
                .wrap_err_with(|| format!("Invalid {} value: {:?}", key, raw))?;
            Ok(Duration::from_millis(millis))
        }
        Err(_) => Ok(default),
    }
}

fn parse_accounts(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).map_err(|e| eyre!("Invalid address {}: {}", s, e)))
        .collect()
}
