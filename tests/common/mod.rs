#![allow(dead_code)]

use ethers::types::{Address, U256};
use liquidity_router::adapters::InMemoryGateway;
use liquidity_router::gateway::PoolTokens;
use liquidity_router::types::QuoteCandidate;
use liquidity_router::Settings;
use std::path::Path;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn pool_tokens(tokens: &[u64]) -> PoolTokens {
    PoolTokens::new(tokens.iter().map(|&t| addr(t)).collect())
}

pub fn quote(pool: u64, amount_out: u64) -> Vec<QuoteCandidate> {
    vec![QuoteCandidate::new(addr(pool), U256::from(amount_out))]
}

/// Pool1 {A,B}, Pool2 {B,C} with A=1 B=2 C=3; A->B pays 95, B->C pays 90.
pub fn two_pool_gateway() -> InMemoryGateway {
    InMemoryGateway::new()
        .with_pool(addr(101), pool_tokens(&[1, 2]))
        .with_pool(addr(102), pool_tokens(&[2, 3]))
        .with_quote(addr(1), addr(2), quote(101, 95))
        .with_quote(addr(2), addr(3), quote(102, 90))
}

/// Default settings with both caches under `dir`.
pub fn settings_in(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.cache.dir = dir.to_path_buf();
    settings
}
