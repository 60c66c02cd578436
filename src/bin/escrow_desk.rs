use std::sync::Arc;

use dotenvy::dotenv;
use eyre::{eyre, WrapErr};
use futures::future::join_all;
use tracing::{info, warn};

use escrow_swap_desk::config;
use escrow_swap_desk::desk::EscrowDesk;
use escrow_swap_desk::escrow::types::format_address;
use escrow_swap_desk::escrow::NewTrade;
use escrow_swap_desk::logging;
use escrow_swap_desk::market::TokenRegistry;
use escrow_swap_desk::wallet::simulated::SimulatedProvider;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME").to_string()) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    let cfg = config::Config::load()?;
    info!(delays = ?cfg.delays, accounts = cfg.simulated_accounts.len(), "Configuration loaded");

    let tokens = TokenRegistry::load(cfg.token_list_path.as_deref())?;
    let provider = Arc::new(SimulatedProvider::new(cfg.simulated_accounts.clone()));
    let desk = EscrowDesk::from_config(Some(provider.clone()), &cfg);

    // Nothing authorized yet, so this stays disconnected
    desk.session().restore_session().await;

    let creator = desk
        .session()
        .connect()
        .await
        .wrap_err("Wallet connection failed")?
        .ok_or_else(|| eyre!("Simulated wallet exposed no accounts"))?;
    info!(creator = %format_address(&creator), "Connected");

    let pairs = [("BTC", "ETH", "1.5", "20"), ("SOL", "USDC", "10", "987.6")];
    let mut trade_ids = Vec::new();
    for (from, to, from_amount, to_amount) in pairs {
        let (Some(from_token), Some(to_token)) = (tokens.get(from), tokens.get(to)) else {
            warn!(from, to, "Pair not listed, skipping");
            continue;
        };
        info!(
            from = %from_token.symbol,
            from_price = %from_token.display_price(),
            to = %to_token.symbol,
            to_price = %to_token.display_price(),
            "Opening escrow"
        );
        let request = NewTrade::from_form(from, to, from_amount, to_amount, "")?;
        let trade = desk.create(request).await?;
        trade_ids.push(trade.id);
    }

    // Complete the oldest trade and cancel the newest one
    let mut settlements = Vec::new();
    if let Some(oldest) = trade_ids.first() {
        settlements.push(desk.complete(oldest).await?);
    }
    if let Some(newest) = trade_ids.last().filter(|id| Some(*id) != trade_ids.first()) {
        settlements.push(desk.cancel(newest).await?);
    }

    // A second complete while the first is confirming is rejected
    if let Some(oldest) = trade_ids.first() {
        if let Err(e) = desk.complete(oldest).await {
            info!(error = %e, "Duplicate action rejected");
        }
    }

    for outcome in join_all(settlements.into_iter().map(|s| s.settled())).await {
        info!(outcome = ?outcome, "Settlement finished");
    }

    // The user revokes access from inside the extension
    provider.revoke();
    info!(session = ?desk.session().snapshot(), "Session after revoke");

    let book = desk
        .trades()
        .await
        .iter()
        .map(|view| view.trade.to_string())
        .collect::<Vec<_>>()
        .join("\n  ");
    info!("Trade book:\n  {}", book);

    Ok(())
}
