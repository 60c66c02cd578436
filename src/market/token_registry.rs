use std::fs;
use std::path::Path;

use eyre::{Result, WrapErr};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::token::Token;

#[derive(Debug, Deserialize)]
struct TokenFile {
    tokens: Vec<Token>,
}

/// Read-only token list in display order
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRegistry {
    tokens: Vec<Token>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self {
            tokens: vec![
                Token::new("BTC", "Bitcoin", 43250.75, 2.34),
                Token::new("ETH", "Ethereum", 2580.42, -1.23),
                Token::new("USDC", "USD Coin", 1.0001, 0.01),
                Token::new("USDT", "Tether", 0.9998, -0.02),
                Token::new("SOL", "Solana", 98.76, 5.67),
                Token::new("ADA", "Cardano", 0.4523, -2.45),
                Token::new("DOT", "Polkadot", 7.89, 1.78),
                Token::new("LINK", "Chainlink", 14.56, 3.21),
            ],
        }
    }
}

impl TokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Load `{ "tokens": [...] }` from disk
    #[instrument]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file_content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read token list {}", path.display()))?;
        let registry = Self::from_json(&file_content)
            .wrap_err_with(|| format!("Malformed token list {}", path.display()))?;
        info!(loaded_count = registry.len(), "Tokens loaded from file");
        Ok(registry)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: TokenFile = serde_json::from_str(json)?;
        for token in parsed.tokens.iter() {
            debug!(symbol = %token.symbol, price = token.price, "Loaded token");
        }
        Ok(Self::new(parsed.tokens))
    }

    /// Configured file if one is given, otherwise the built-in list
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
