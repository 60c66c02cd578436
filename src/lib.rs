pub mod config;
pub mod desk;
pub mod escrow;
pub mod logging;
pub mod market;
pub mod wallet;
