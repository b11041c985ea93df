//! # Pricing Gateway Trait
//!
//! The remote, read-only source of everything the router knows: which pools
//! exist, which tokens each pool holds, and what a pool would pay out for a
//! given input. Implementations talk to a registry contract, a snapshot, or a
//! test fixture; the routing core only ever sees this trait.
//!
//! ## Failure model
//!
//! Gateway calls are slow, rate-limited and may fail transiently. Every
//! method returns a [`GatewayError`] on failure and callers decide what to do
//! with it: the pool graph rebuild skips the pool, the quote service retries
//! and eventually reports "no candidate for this hop".
//!
//! ## Example
//!
//! ```rust,no_run
//! use liquidity_router::gateway::{PricingGateway, PoolTokens};
//! use liquidity_router::error::GatewayError;
//! use liquidity_router::types::{Amount, PoolId, QuoteCandidate, Token};
//! use async_trait::async_trait;
//!
//! struct Snapshot;
//!
//! #[async_trait]
//! impl PricingGateway for Snapshot {
//!     fn name(&self) -> &'static str {
//!         "snapshot"
//!     }
//!
//!     async fn enumerate_pools(&self) -> Result<Vec<PoolId>, GatewayError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn pool_tokens(&self, _pool: PoolId) -> Result<PoolTokens, GatewayError> {
//!         Ok(PoolTokens::default())
//!     }
//!
//!     async fn quote(
//!         &self,
//!         _token_in: Token,
//!         _token_out: Token,
//!         _amount_in: Amount,
//!     ) -> Result<Vec<QuoteCandidate>, GatewayError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::types::{Amount, PoolId, QuoteCandidate, Token};

/// Token membership of one pool as the registry reports it.
///
/// Registries pad fixed-size arrays with the zero address; the pool graph
/// builder drops those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolTokens {
    /// Coins the pool holds directly
    pub coins: Vec<Token>,
    /// Underlying coins of lending/meta pools (empty for plain pools)
    pub underlying: Vec<Token>,
}

impl PoolTokens {
    pub fn new(coins: Vec<Token>) -> Self {
        Self {
            coins,
            underlying: Vec::new(),
        }
    }

    pub fn with_underlying(coins: Vec<Token>, underlying: Vec<Token>) -> Self {
        Self { coins, underlying }
    }

    /// Both views chained; either representation is swappable at quote time.
    pub fn all(&self) -> impl Iterator<Item = &Token> {
        self.coins.iter().chain(self.underlying.iter())
    }
}

/// Read interface to the remote pool registry and pricing primitive.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the quote service calls `quote`
/// from many tasks at once.
#[async_trait]
pub trait PricingGateway: Send + Sync {
    /// Short name for logs and metric labels.
    fn name(&self) -> &'static str;

    /// Lists every pool id known to the registry.
    ///
    /// # Errors
    ///
    /// Fails only when the registry itself cannot be read. Implementations
    /// that enumerate item by item should skip unreadable entries instead.
    async fn enumerate_pools(&self) -> Result<Vec<PoolId>, GatewayError>;

    /// Returns the tokens held by `pool`, primary and underlying.
    async fn pool_tokens(&self, pool: PoolId) -> Result<PoolTokens, GatewayError>;

    /// Quotes `amount_in` of `token_in` into `token_out` across every pool
    /// able to serve the pair. An empty vector means no pool can.
    async fn quote(
        &self,
        token_in: Token,
        token_out: Token,
        amount_in: Amount,
    ) -> Result<Vec<QuoteCandidate>, GatewayError>;
}
