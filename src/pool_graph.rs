//! # Pool Graph
//!
//! Bipartite pool↔token membership graph. Tokens and pools are interned into
//! index sets, adjacency is kept as sorted index lists in both directions,
//! and addresses only appear at the API boundary.
//!
//! A `PoolGraph` is immutable once built. A refresh builds a new one with
//! [`PoolGraphBuilder`] and swaps it in wholesale.

use ethers::types::Address;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::gateway::PoolTokens;
use crate::types::conversions::{address_to_string, string_to_address, ConversionError, NULL_ADDRESS};
use crate::types::{PoolId, Token};

type TokenIdx = u32;
type PoolIdx = u32;

#[derive(Debug, Clone, Default)]
pub struct PoolGraph {
    tokens: IndexSet<Token>,
    pools: IndexSet<PoolId>,
    // pool idx -> sorted token idxs
    pool_tokens: Vec<Vec<TokenIdx>>,
    // token idx -> sorted pool idxs
    token_pools: Vec<Vec<PoolIdx>>,
}

impl PoolGraph {
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn contains_token(&self, token: &Token) -> bool {
        self.tokens.contains(token)
    }

    /// Every token held by at least one pool, in arena order.
    pub fn all_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn all_pools(&self) -> impl Iterator<Item = &PoolId> {
        self.pools.iter()
    }

    pub fn pools_for_token(&self, token: &Token) -> HashSet<PoolId> {
        self.token_index(token)
            .map(|t| {
                self.token_pools[t as usize]
                    .iter()
                    .map(|&p| self.pools[p as usize])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tokens_for_pool(&self, pool: &PoolId) -> HashSet<Token> {
        self.pools
            .get_index_of(pool)
            .map(|p| {
                self.pool_tokens[p]
                    .iter()
                    .map(|&t| self.tokens[t as usize])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether at least one pool holds both tokens.
    pub fn share_pool(&self, a: &Token, b: &Token) -> bool {
        match (self.token_index(a), self.token_index(b)) {
            (Some(a), Some(b)) => self.share_pool_idx(a, b),
            _ => false,
        }
    }

    /// Tokens co-located with `token` in any pool, excluding `token` itself.
    pub fn neighbours(&self, token: &Token) -> HashSet<Token> {
        self.token_index(token)
            .map(|t| {
                self.neighbour_idxs(t)
                    .into_iter()
                    .map(|n| self.tokens[n as usize])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks `pool ∈ token_pools[t] ⟺ t ∈ pool_tokens[pool]`.
    pub fn is_consistent(&self) -> bool {
        if self.pool_tokens.len() != self.pools.len() || self.token_pools.len() != self.tokens.len() {
            return false;
        }
        let forward = self.pool_tokens.iter().enumerate().all(|(p, tokens)| {
            tokens.iter().all(|&t| {
                self.token_pools
                    .get(t as usize)
                    .map_or(false, |pools| pools.binary_search(&(p as PoolIdx)).is_ok())
            })
        });
        let backward = self.token_pools.iter().enumerate().all(|(t, pools)| {
            pools.iter().all(|&p| {
                self.pool_tokens
                    .get(p as usize)
                    .map_or(false, |tokens| tokens.binary_search(&(t as TokenIdx)).is_ok())
            })
        });
        forward && backward
    }

    pub(crate) fn token_index(&self, token: &Token) -> Option<TokenIdx> {
        self.tokens.get_index_of(token).map(|i| i as TokenIdx)
    }

    pub(crate) fn token_at(&self, idx: TokenIdx) -> Token {
        self.tokens[idx as usize]
    }

    pub(crate) fn share_pool_idx(&self, a: TokenIdx, b: TokenIdx) -> bool {
        let (xs, ys) = (&self.token_pools[a as usize], &self.token_pools[b as usize]);
        // both sorted: merge-walk
        let (mut i, mut j) = (0, 0);
        while i < xs.len() && j < ys.len() {
            match xs[i].cmp(&ys[j]) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        false
    }

    pub(crate) fn neighbour_idxs(&self, token: TokenIdx) -> BTreeSet<TokenIdx> {
        let mut out: BTreeSet<TokenIdx> = self.token_pools[token as usize]
            .iter()
            .flat_map(|&p| self.pool_tokens[p as usize].iter().copied())
            .collect();
        out.remove(&token);
        out
    }

    /// Serialisable view; inverse of [`PoolGraph::from_persisted`].
    pub fn to_persisted(&self, timestamp: f64) -> PersistedPoolGraph {
        let pool_tokens = self
            .pools
            .iter()
            .zip(&self.pool_tokens)
            .map(|(pool, tokens)| {
                (
                    address_to_string(*pool),
                    tokens.iter().map(|&t| address_to_string(self.tokens[t as usize])).collect(),
                )
            })
            .collect();
        let token_pools = self
            .tokens
            .iter()
            .zip(&self.token_pools)
            .map(|(token, pools)| {
                (
                    address_to_string(*token),
                    pools.iter().map(|&p| address_to_string(self.pools[p as usize])).collect(),
                )
            })
            .collect();
        PersistedPoolGraph {
            timestamp,
            pool_tokens,
            token_pools,
            all_tokens: self.tokens.iter().map(|t| address_to_string(*t)).collect(),
        }
    }

    /// Rebuilds the graph from `pool_tokens` and cross-checks the redundant
    /// `token_pools` and `all_tokens` maps against it.
    pub fn from_persisted(persisted: &PersistedPoolGraph) -> Result<Self, PersistedGraphError> {
        let mut pools: Vec<(&String, &Vec<String>)> = persisted.pool_tokens.iter().collect();
        // HashMap order is arbitrary; keep arena order stable across loads
        pools.sort_by(|a, b| a.0.cmp(b.0));

        let mut builder = PoolGraphBuilder::new();
        for (pool, tokens) in pools {
            let pool = string_to_address(pool)?;
            let tokens = tokens
                .iter()
                .map(|t| string_to_address(t))
                .collect::<Result<Vec<_>, _>>()?;
            builder.add_pool(pool, &PoolTokens::new(tokens));
        }
        let graph = builder.build();

        for (token, pools) in &persisted.token_pools {
            let token = string_to_address(token)?;
            let expected = graph.pools_for_token(&token);
            let stored = pools
                .iter()
                .map(|p| string_to_address(p))
                .collect::<Result<HashSet<_>, _>>()?;
            if expected != stored {
                return Err(PersistedGraphError::Inconsistent(format!(
                    "token {} lists {} pools, pool map implies {}",
                    address_to_string(token),
                    stored.len(),
                    expected.len()
                )));
            }
        }
        let all_tokens = persisted
            .all_tokens
            .iter()
            .map(|t| string_to_address(t))
            .collect::<Result<HashSet<_>, _>>()?;
        if all_tokens.len() != graph.token_count() || !graph.all_tokens().all(|t| all_tokens.contains(t)) {
            return Err(PersistedGraphError::Inconsistent("all_tokens does not match pool map".to_string()));
        }
        Ok(graph)
    }
}

/// Accumulates pool memberships, then freezes them into a [`PoolGraph`].
#[derive(Debug, Default)]
pub struct PoolGraphBuilder {
    tokens: IndexSet<Token>,
    pools: IndexSet<PoolId>,
    pool_tokens: Vec<BTreeSet<TokenIdx>>,
}

impl PoolGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds coins and underlying coins into one token set for `pool`.
    ///
    /// Zero addresses are dropped. Returns `false` (and records nothing) when
    /// fewer than two distinct tokens remain, since such a pool can't serve
    /// any hop. Adding the same pool twice merges the token sets.
    pub fn add_pool(&mut self, pool: PoolId, tokens: &PoolTokens) -> bool {
        let distinct: BTreeSet<Token> = tokens.all().copied().filter(|t| *t != NULL_ADDRESS).collect();
        if pool == NULL_ADDRESS || (distinct.len() < 2 && !self.pools.contains(&pool)) {
            return false;
        }
        let (pool_idx, _) = self.pools.insert_full(pool);
        if pool_idx == self.pool_tokens.len() {
            self.pool_tokens.push(BTreeSet::new());
        }
        for token in distinct {
            let (token_idx, _) = self.tokens.insert_full(token);
            self.pool_tokens[pool_idx].insert(token_idx as TokenIdx);
        }
        true
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn build(self) -> PoolGraph {
        let mut token_pools: Vec<Vec<PoolIdx>> = vec![Vec::new(); self.tokens.len()];
        for (p, tokens) in self.pool_tokens.iter().enumerate() {
            for &t in tokens {
                // pools visited in ascending order, so each list stays sorted
                token_pools[t as usize].push(p as PoolIdx);
            }
        }
        PoolGraph {
            tokens: self.tokens,
            pools: self.pools,
            pool_tokens: self.pool_tokens.into_iter().map(|s| s.into_iter().collect()).collect(),
            token_pools,
        }
    }
}

/// On-disk shape of the pool graph blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPoolGraph {
    pub timestamp: f64,
    pub pool_tokens: HashMap<String, Vec<String>>,
    pub token_pools: HashMap<String, Vec<String>>,
    pub all_tokens: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistedGraphError {
    #[error(transparent)]
    Address(#[from] ConversionError),
    #[error("inconsistent pool graph blob: {0}")]
    Inconsistent(String),
}
