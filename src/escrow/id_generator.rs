use std::sync::atomic::{AtomicU64, Ordering};

use ethers::types::Address;
use rand::Rng;

/// Source of trade ids and simulated escrow contract addresses
pub trait IdGenerator: Send + Sync {
    fn next_trade_id(&self) -> String;
    fn next_escrow_address(&self) -> Address;
}

/// 96-bit random trade ids and 160-bit random escrow addresses
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_trade_id(&self) -> String {
        let mut bytes = [0u8; 12];
        rand::rng().fill(&mut bytes[..]);
        hex::encode(bytes)
    }

    fn next_escrow_address(&self) -> Address {
        let mut bytes = [0u8; 20];
        rand::rng().fill(&mut bytes[..]);
        Address::from(bytes)
    }
}

/// Deterministic ids (`trade-1`, `trade-2`, ...) for tests and replays
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_trade_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("trade-{}", n)
    }

    fn next_escrow_address(&self) -> Address {
        let n = self.counter.load(Ordering::Relaxed);
        Address::from_low_u64_be(0xE5C0_0000_0000 + n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_ids_do_not_collide() {
        let ids = RandomIdGenerator;
        let trade_ids: HashSet<String> = (0..1000).map(|_| ids.next_trade_id()).collect();
        let escrows: HashSet<Address> = (0..1000).map(|_| ids.next_escrow_address()).collect();
        assert_eq!(trade_ids.len(), 1000);
        assert_eq!(escrows.len(), 1000);
        assert!(trade_ids.iter().all(|id| id.len() == 24));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.next_trade_id(), "trade-1");
        let first_escrow = ids.next_escrow_address();
        assert_eq!(ids.next_trade_id(), "trade-2");
        assert_ne!(ids.next_escrow_address(), first_escrow);
    }
}
