//! # Router Module
//!
//! Routing primitives: a [`Route`] is a token path found in the pool graph,
//! a [`RouteResult`] is that path priced hop by hop for one input amount.
//! Simulation and best-route selection live in [`simulator`].

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::types::{Amount, PoolId, PoolKind, QuoteCandidate, Token};

pub mod simulator;

pub use simulator::RouteSimulator;

/// Ordered token path from the input token to the output token.
///
/// Consecutive tokens share at least one pool; no token repeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub path: Vec<Token>,
}

impl Route {
    pub fn new(path: Vec<Token>) -> Self {
        Self { path }
    }

    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Consecutive `(token_in, token_out)` pairs, in execution order.
    pub fn pairs(&self) -> impl Iterator<Item = (Token, Token)> + '_ {
        self.path.windows(2).map(|w| (w[0], w[1]))
    }

    /// Readable identifier, e.g. for logs.
    pub fn get_id(&self) -> String {
        self.path.iter().map(|t| format!("{:?}", t)).join("->")
    }
}

/// A single priced swap step in a simulated route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub token_in: Token,
    pub token_out: Token,
    /// Pool contract chosen for this hop
    pub pool: PoolId,
    /// What actually entered this hop (the previous hop's output)
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub pool_kind: PoolKind,
    pub is_underlying: bool,
    /// Coin indices inside the pool (for Curve-style exchange calls)
    pub token_indices: (u64, u64),
}

impl Hop {
    pub fn from_quote(token_in: Token, token_out: Token, amount_in: Amount, quote: &QuoteCandidate) -> Self {
        Self {
            token_in,
            token_out,
            pool: quote.pool,
            amount_in,
            amount_out: quote.amount_out,
            pool_kind: quote.pool_kind,
            is_underlying: quote.is_underlying,
            token_indices: (quote.source_index, quote.dest_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    pub path: Vec<Token>,
    pub hops: Vec<Hop>,
    pub amount_in: Amount,
    pub amount_out: Amount,
}

/// The winning route plus every route that simulated successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestRoute {
    pub best: RouteResult,
    pub all: Vec<RouteResult>,
}
