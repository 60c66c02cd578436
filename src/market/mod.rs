pub mod token;
pub mod token_registry;

pub use token::Token;
pub use token_registry::TokenRegistry;
