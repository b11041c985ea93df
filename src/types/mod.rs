//! Identifiers and quote payloads shared by every layer.

pub mod conversions;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Fungible asset identifier.
pub type Token = Address;
/// Liquidity venue identifier.
pub type PoolId = Address;
/// Raw on-chain token amount.
pub type Amount = U256;

/// Pool type code as reported by the rate provider.
///
/// The code is passed through untouched; it only matters to whoever executes
/// the swap, routing never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PoolKind(pub u64);

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type-{}", self.0)
    }
}

/// One way to execute a single hop through one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCandidate {
    pub pool: PoolId,
    pub amount_out: Amount,
    /// Pool balance of the input token
    pub source_balance: Amount,
    /// Pool balance of the output token
    pub dest_balance: Amount,
    pub pool_kind: PoolKind,
    /// Whether the swap goes through the pool's underlying coins
    pub is_underlying: bool,
    pub source_index: u64,
    pub dest_index: u64,
}

impl QuoteCandidate {
    /// Minimal candidate, mostly useful for fixtures.
    pub fn new(pool: PoolId, amount_out: Amount) -> Self {
        Self {
            pool,
            amount_out,
            source_balance: U256::zero(),
            dest_balance: U256::zero(),
            pool_kind: PoolKind::default(),
            is_underlying: false,
            source_index: 0,
            dest_index: 0,
        }
    }
}
