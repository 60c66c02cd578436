use dotenvy::dotenv;
use tracing::info;

use escrow_swap_desk::config;
use escrow_swap_desk::logging;
use escrow_swap_desk::market::TokenRegistry;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    logging::init_logging(env!("CARGO_BIN_NAME").to_string())?;

    let cfg = config::Config::load()?;
    let registry = TokenRegistry::load(cfg.token_list_path.as_deref())?;

    let output = registry
        .tokens()
        .iter()
        .map(|token| {
            format!(
                "{} ({}): {} {}",
                token.symbol,
                token.name,
                token.display_price(),
                token.display_change()
            )
        })
        .collect::<Vec<String>>()
        .join("\n");
    info!(count = registry.len(), "Market overview\n{}", output);

    Ok(())
}
