use serde::{Deserialize, Serialize};

/// Static market entry shown next to the escrow form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change24h: f64, // percent
}

impl Token {
    pub fn new(symbol: &str, name: &str, price: f64, change24h: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            change24h,
        }
    }

    pub fn is_up(&self) -> bool {
        self.change24h >= 0.0
    }

    pub fn display_price(&self) -> String {
        format!("${:.4}", self.price)
    }

    pub fn display_change(&self) -> String {
        format!("{}{:.2}%", if self.is_up() { "+" } else { "" }, self.change24h)
    }
}
