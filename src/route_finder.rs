//! # Route Finder
//!
//! Enumerates candidate token paths of up to three hops from the pool graph
//! and caches them per ordered `(token_in, token_out)` pair.
//!
//! The route table has its own TTL, independent of the pool graph's. Reads
//! go through an `ArcSwap` snapshot; writers serialise on a mutex and swap
//! in a new table, so a reader never observes a half-updated table.
//!
//! Each pair remembers the hop depth it was enumerated to. A request for
//! fewer hops is served from a deeper entry; a deeper request recomputes.
//! Expired pairs are dropped whenever the table is rewritten.
//!
//! On disk each `"<in>|<out>"` key maps to `{built_at, depth, routes}`,
//! where `routes` is the usual list of `{path, hops}`; the wrapper carries
//! the per-pair age and depth across restarts.
//!
//! Only graph membership is checked here. Whether a hop actually has
//! liquidity is found out later, when the quote service returns no
//! candidates for it.

use anyhow::Result;
use arc_swap::ArcSwap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::{CacheEntry, Clock, JsonCacheFile, SystemClock};
use crate::metrics;
use crate::pool_graph::PoolGraph;
use crate::pool_graph_cache::PoolGraphCache;
use crate::router::Route;
use crate::types::conversions::{pair_key, parse_pair_key};
use crate::types::Token;

const CACHE_NAME: &str = "routes";
/// Longest path the finder ever enumerates
pub const MAX_SUPPORTED_HOPS: usize = 3;

/// Which tokens are tried as intermediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntermediateStrategy {
    /// Tokens co-located with either endpoint
    #[default]
    Union,
    /// Tokens co-located with the input token only
    InputReachable,
}

#[derive(Debug, Clone)]
pub struct RouteFinderConfig {
    pub ttl: Duration,
    pub strategy: IntermediateStrategy,
    /// 3-hop search is skipped above this many intermediates
    pub max_three_hop_candidates: usize,
}

impl Default for RouteFinderConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            strategy: IntermediateStrategy::Union,
            max_three_hop_candidates: 64,
        }
    }
}

/// Routes of one pair, enumerated up to `depth` hops.
#[derive(Debug)]
struct PairRoutes {
    depth: usize,
    routes: Vec<Route>,
}

type RouteTable = HashMap<(Token, Token), CacheEntry<Arc<PairRoutes>>>;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRoute {
    path: Vec<Token>,
    hops: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedPair {
    built_at: f64,
    // blobs written before depth was recorded were always full depth
    #[serde(default = "default_depth")]
    depth: usize,
    routes: Vec<PersistedRoute>,
}

fn default_depth() -> usize {
    MAX_SUPPORTED_HOPS
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedRoutes {
    timestamp: f64,
    routes: HashMap<String, PersistedPair>,
}

pub struct RouteFinder {
    graph: Arc<PoolGraphCache>,
    config: RouteFinderConfig,
    store: Option<JsonCacheFile>,
    clock: Arc<dyn Clock>,
    table: ArcSwap<RouteTable>,
    // guards writes to `table`; true once the persisted table was merged in
    write_lock: Mutex<bool>,
}

impl RouteFinder {
    pub fn new(graph: Arc<PoolGraphCache>, config: RouteFinderConfig) -> Self {
        Self {
            graph,
            config,
            store: None,
            clock: Arc::new(SystemClock),
            table: ArcSwap::from_pointee(RouteTable::new()),
            write_lock: Mutex::new(false),
        }
    }

    pub fn with_store(mut self, store: JsonCacheFile) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RouteFinderConfig {
        &self.config
    }

    /// Candidate routes from `token_in` to `token_out` of at most `max_hops`
    /// hops (clamped to 3).
    ///
    /// Served from the route cache while the pair's entry is fresh; otherwise
    /// recomputed from the current pool graph, cached and persisted.
    ///
    /// # Errors
    ///
    /// Only when the pool graph itself cannot be obtained.
    pub async fn find_routes(&self, token_in: Token, token_out: Token, max_hops: usize) -> Result<Vec<Route>> {
        let max_hops = max_hops.min(MAX_SUPPORTED_HOPS);
        if max_hops == 0 || token_in == token_out {
            return Ok(Vec::new());
        }
        let key = (token_in, token_out);

        if let Some(routes) = self.fresh_routes(&key, max_hops) {
            metrics::increment_cache_hit(CACHE_NAME);
            return Ok(limit_hops(&routes.routes, max_hops));
        }

        let mut loaded = self.write_lock.lock().await;
        if !*loaded {
            self.merge_persisted().await;
            *loaded = true;
        }
        if let Some(routes) = self.fresh_routes(&key, max_hops) {
            metrics::increment_cache_hit(CACHE_NAME);
            return Ok(limit_hops(&routes.routes, max_hops));
        }
        metrics::increment_cache_miss(CACHE_NAME);

        let graph = self.graph.get().await?;
        let routes = enumerate_routes(
            &graph,
            token_in,
            token_out,
            max_hops,
            self.config.strategy,
            self.config.max_three_hop_candidates,
        );
        debug!(
            "Computed {} routes of up to {} hops for {:?}->{:?}",
            routes.len(),
            max_hops,
            token_in,
            token_out
        );

        let now = self.clock.now();
        let ttl = self.config.ttl;
        let mut table = RouteTable::clone(&self.table.load());
        let before = table.len();
        table.retain(|_, entry| entry.is_fresh(now, ttl));
        if table.len() < before {
            debug!("Evicted {} expired route pairs", before - table.len());
        }
        table.insert(
            key,
            CacheEntry::new(
                Arc::new(PairRoutes {
                    depth: max_hops,
                    routes: routes.clone(),
                }),
                now,
            ),
        );
        let table = Arc::new(table);
        self.table.store(Arc::clone(&table));
        metrics::set_cache_size(CACHE_NAME, table.len());
        self.persist(&table).await;

        Ok(routes)
    }

    /// Drops every cached pair, in memory and on disk.
    pub async fn invalidate(&self) {
        let mut loaded = self.write_lock.lock().await;
        self.table.store(Arc::new(RouteTable::new()));
        // nothing on disk is worth merging any more
        *loaded = true;
        if let Some(store) = &self.store {
            store.remove().await;
        }
        metrics::set_cache_size(CACHE_NAME, 0);
        info!("🧹 Route cache invalidated");
    }

    /// Pairs currently in the in-memory route table, fresh or not.
    pub fn cached_pairs(&self) -> usize {
        self.table.load().len()
    }

    /// Fresh entry for `key` enumerated at least `max_hops` deep.
    fn fresh_routes(&self, key: &(Token, Token), max_hops: usize) -> Option<Arc<PairRoutes>> {
        let table = self.table.load();
        let entry = table.get(key)?;
        (entry.is_fresh(self.clock.now(), self.config.ttl) && entry.value.depth >= max_hops)
            .then(|| Arc::clone(&entry.value))
    }

    /// Must be called with `write_lock` held.
    async fn merge_persisted(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(persisted) = store.load_or_discard::<PersistedRoutes>().await else {
            return;
        };

        let now = self.clock.now();
        let mut table = RouteTable::clone(&self.table.load());
        let mut restored = 0usize;
        for (key, pair) in persisted.routes {
            let Ok(tokens) = parse_pair_key(&key) else {
                warn!("⚠️ Skipping malformed route cache key {}", key);
                continue;
            };
            let entry = CacheEntry::new((), pair.built_at);
            if !entry.is_fresh(now, self.config.ttl) {
                continue;
            }
            let routes = PairRoutes {
                depth: pair.depth.min(MAX_SUPPORTED_HOPS),
                routes: pair.routes.into_iter().map(|r| Route::new(r.path)).collect(),
            };
            // in-memory entries are at least as recent as the file
            table
                .entry(tokens)
                .or_insert_with(|| CacheEntry::new(Arc::new(routes), pair.built_at));
            restored += 1;
        }
        if restored > 0 {
            info!("📂 Restored {} route pairs from {}", restored, store.path().display());
        }
        metrics::set_cache_size(CACHE_NAME, table.len());
        self.table.store(Arc::new(table));
    }

    async fn persist(&self, table: &RouteTable) {
        let Some(store) = &self.store else {
            return;
        };
        let routes = table
            .iter()
            .map(|((token_in, token_out), entry)| {
                let pair = PersistedPair {
                    built_at: entry.built_at,
                    depth: entry.value.depth,
                    routes: entry
                        .value
                        .routes
                        .iter()
                        .map(|route| PersistedRoute {
                            path: route.path.clone(),
                            hops: route.hop_count(),
                        })
                        .collect(),
                };
                (pair_key(*token_in, *token_out), pair)
            })
            .collect();
        let blob = PersistedRoutes {
            timestamp: self.clock.now(),
            routes,
        };
        if let Err(e) = store.store(&blob).await {
            warn!("⚠️ Could not persist route cache: {}", e);
        }
    }
}

fn limit_hops(routes: &[Route], max_hops: usize) -> Vec<Route> {
    routes
        .iter()
        .filter(|route| route.hop_count() <= max_hops)
        .cloned()
        .collect()
}

/// Every path of at most `max_hops` hops whose consecutive tokens share a
/// pool in `graph`.
///
/// Order is deterministic: the direct route, then 2-hop routes, then 3-hop
/// routes, intermediates in graph order.
pub fn enumerate_routes(
    graph: &PoolGraph,
    token_in: Token,
    token_out: Token,
    max_hops: usize,
    strategy: IntermediateStrategy,
    max_three_hop_candidates: usize,
) -> Vec<Route> {
    let max_hops = max_hops.min(MAX_SUPPORTED_HOPS);
    if max_hops == 0 || token_in == token_out {
        return Vec::new();
    }
    let (Some(src), Some(dst)) = (graph.token_index(&token_in), graph.token_index(&token_out)) else {
        return Vec::new();
    };

    let mut routes = Vec::new();
    if graph.share_pool_idx(src, dst) {
        routes.push(Route::new(vec![token_in, token_out]));
    }
    if max_hops < 2 {
        return routes;
    }

    let mut candidates: BTreeSet<u32> = graph.neighbour_idxs(src);
    if strategy == IntermediateStrategy::Union {
        candidates.extend(graph.neighbour_idxs(dst));
    }
    candidates.remove(&src);
    candidates.remove(&dst);

    for &mid in &candidates {
        if graph.share_pool_idx(src, mid) && graph.share_pool_idx(mid, dst) {
            routes.push(Route::new(vec![token_in, graph.token_at(mid), token_out]));
        }
    }

    if max_hops < 3 {
        return routes;
    }
    if candidates.len() > max_three_hop_candidates {
        warn!(
            "⚠️ {} intermediates for {:?}->{:?} exceed the 3-hop limit of {}, skipping 3-hop search",
            candidates.len(),
            token_in,
            token_out,
            max_three_hop_candidates
        );
        return routes;
    }

    for &first in &candidates {
        if !graph.share_pool_idx(src, first) {
            continue;
        }
        for &second in &candidates {
            if second != first && graph.share_pool_idx(first, second) && graph.share_pool_idx(second, dst) {
                routes.push(Route::new(vec![
                    token_in,
                    graph.token_at(first),
                    graph.token_at(second),
                    token_out,
                ]));
            }
        }
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryGateway;
    use crate::cache::ManualClock;
    use crate::gateway::PoolTokens;
    use crate::pool_graph_cache::graph_from_memberships;
    use ethers::types::Address;
    use std::collections::HashSet;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn pool(n: u64, tokens: &[u64]) -> (Address, PoolTokens) {
        (addr(n), PoolTokens::new(tokens.iter().map(|&t| addr(t)).collect()))
    }

    /// A=1 B=2 C=3 D=4 E=5
    fn sample_graph() -> PoolGraph {
        graph_from_memberships(vec![
            pool(100, &[1, 2]),
            pool(101, &[2, 3]),
            pool(102, &[1, 4]),
            pool(103, &[4, 5]),
            pool(104, &[5, 3]),
            pool(105, &[1, 3]),
        ])
    }

    fn assert_valid(routes: &[Route], token_in: Token, token_out: Token, max_hops: usize, graph: &PoolGraph) {
        for route in routes {
            assert_eq!(route.path.first(), Some(&token_in));
            assert_eq!(route.path.last(), Some(&token_out));
            assert!(route.path.len() <= max_hops + 1);
            let unique: HashSet<_> = route.path.iter().collect();
            assert_eq!(unique.len(), route.path.len(), "repeated token in {:?}", route.path);
            for (a, b) in route.pairs() {
                assert!(graph.share_pool(&a, &b));
            }
        }
    }

    #[test]
    fn test_end_to_end_graph_has_single_route() {
        let graph = graph_from_memberships(vec![pool(100, &[1, 2]), pool(101, &[2, 3])]);
        let routes = enumerate_routes(&graph, addr(1), addr(3), 3, IntermediateStrategy::Union, 64);
        assert_eq!(routes, vec![Route::new(vec![addr(1), addr(2), addr(3)])]);
    }

    #[test]
    fn test_routes_are_valid_for_every_hop_limit() {
        let graph = sample_graph();
        for max_hops in 0..=5 {
            let routes = enumerate_routes(&graph, addr(1), addr(3), max_hops, IntermediateStrategy::Union, 64);
            assert_valid(&routes, addr(1), addr(3), max_hops.min(3), &graph);
        }
    }

    #[test]
    fn test_direct_then_two_then_three_hops() {
        let graph = sample_graph();
        let routes = enumerate_routes(&graph, addr(1), addr(3), 3, IntermediateStrategy::Union, 64);
        let hop_counts: Vec<_> = routes.iter().map(Route::hop_count).collect();
        let mut sorted = hop_counts.clone();
        sorted.sort();
        assert_eq!(hop_counts, sorted);
        assert!(routes.contains(&Route::new(vec![addr(1), addr(3)])));
        assert!(routes.contains(&Route::new(vec![addr(1), addr(2), addr(3)])));
        assert!(routes.contains(&Route::new(vec![addr(1), addr(4), addr(5), addr(3)])));
    }

    #[test]
    fn test_three_hop_search_skipped_above_candidate_limit() {
        let graph = sample_graph();
        let routes = enumerate_routes(&graph, addr(1), addr(3), 3, IntermediateStrategy::Union, 1);
        assert!(routes.iter().all(|r| r.hop_count() <= 2));
    }

    #[test]
    fn test_input_reachable_strategy_is_narrower() {
        // E (5) only reachable from the output side
        let graph = graph_from_memberships(vec![pool(100, &[1, 2]), pool(101, &[2, 5]), pool(102, &[5, 3])]);
        let union = enumerate_routes(&graph, addr(1), addr(3), 3, IntermediateStrategy::Union, 64);
        let narrow = enumerate_routes(&graph, addr(1), addr(3), 3, IntermediateStrategy::InputReachable, 64);
        assert_eq!(union, vec![Route::new(vec![addr(1), addr(2), addr(5), addr(3)])]);
        assert!(narrow.is_empty());
    }

    #[test]
    fn test_degenerate_requests_have_no_routes() {
        let graph = sample_graph();
        assert!(enumerate_routes(&graph, addr(1), addr(1), 3, IntermediateStrategy::Union, 64).is_empty());
        assert!(enumerate_routes(&graph, addr(1), addr(3), 0, IntermediateStrategy::Union, 64).is_empty());
        assert!(enumerate_routes(&graph, addr(1), addr(99), 3, IntermediateStrategy::Union, 64).is_empty());
    }

    fn finder_over(gateway: Arc<InMemoryGateway>, clock: Arc<ManualClock>, ttl: Duration) -> RouteFinder {
        let graph = Arc::new(PoolGraphCache::new(gateway, Duration::from_secs(86_400)).with_clock(clock.clone()));
        let config = RouteFinderConfig {
            ttl,
            ..RouteFinderConfig::default()
        };
        RouteFinder::new(graph, config).with_clock(clock)
    }

    fn finder(clock: Arc<ManualClock>) -> (Arc<InMemoryGateway>, RouteFinder) {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_pool(addr(100), PoolTokens::new(vec![addr(1), addr(2)]))
                .with_pool(addr(101), PoolTokens::new(vec![addr(2), addr(3)])),
        );
        let finder = finder_over(gateway.clone(), clock, Duration::from_secs(600));
        (gateway, finder)
    }

    fn stored_depth(finder: &RouteFinder, key: (Token, Token)) -> Option<usize> {
        finder.table.load().get(&key).map(|e| e.value.depth)
    }

    #[tokio::test]
    async fn test_shallow_request_skips_three_hop_search_and_deeper_one_recomputes() {
        // only path 1 -> 2 -> 4 -> 3
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_pool(addr(100), PoolTokens::new(vec![addr(1), addr(2)]))
                .with_pool(addr(101), PoolTokens::new(vec![addr(2), addr(4)]))
                .with_pool(addr(102), PoolTokens::new(vec![addr(4), addr(3)])),
        );
        let finder = finder_over(gateway, Arc::new(ManualClock::new(0.0)), Duration::from_secs(600));

        assert!(finder.find_routes(addr(1), addr(3), 2).await.unwrap().is_empty());
        assert_eq!(stored_depth(&finder, (addr(1), addr(3))), Some(2));
        let stored: Vec<_> = finder
            .table
            .load()
            .get(&(addr(1), addr(3)))
            .map(|e| e.value.routes.iter().map(Route::hop_count).collect())
            .unwrap_or_default();
        assert!(stored.iter().all(|&hops| hops <= 2));

        let deeper = finder.find_routes(addr(1), addr(3), 3).await.unwrap();
        assert_eq!(deeper, vec![Route::new(vec![addr(1), addr(2), addr(4), addr(3)])]);
        assert_eq!(stored_depth(&finder, (addr(1), addr(3))), Some(3));

        // served from the deeper entry
        assert!(finder.find_routes(addr(1), addr(3), 2).await.unwrap().is_empty());
        assert_eq!(stored_depth(&finder, (addr(1), addr(3))), Some(3));
    }

    #[tokio::test]
    async fn test_expired_pairs_are_evicted_on_write() {
        let mut gateway = InMemoryGateway::new();
        for n in 0..20u64 {
            gateway = gateway.with_pool(addr(100 + n), PoolTokens::new(vec![addr(1), addr(10 + n)]));
        }
        let clock = Arc::new(ManualClock::new(0.0));
        let finder = finder_over(Arc::new(gateway), clock.clone(), Duration::from_secs(10));

        for n in 0..20u64 {
            clock.set(n as f64 * 100.0);
            finder.find_routes(addr(1), addr(10 + n), 3).await.unwrap();
            assert_eq!(finder.cached_pairs(), 1, "only the pair just built is fresh");
        }

        clock.set(1_905.0);
        finder.find_routes(addr(10), addr(11), 3).await.unwrap();
        assert_eq!(finder.cached_pairs(), 2);
    }

    #[tokio::test]
    async fn test_route_cache_respects_its_own_ttl() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (_gateway, finder) = finder(clock.clone());

        let first = finder.find_routes(addr(1), addr(3), 3).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(finder.cached_pairs(), 1);
        let built_at = finder.table.load().get(&(addr(1), addr(3))).map(|e| e.built_at);

        clock.set(599.0);
        finder.find_routes(addr(1), addr(3), 3).await.unwrap();
        let served = finder.table.load().get(&(addr(1), addr(3))).map(|e| e.built_at);
        assert_eq!(served, built_at, "fresh entry must not be recomputed");

        clock.set(600.0);
        finder.find_routes(addr(1), addr(3), 3).await.unwrap();
        let rebuilt = finder.table.load().get(&(addr(1), addr(3))).map(|e| e.built_at);
        assert_eq!(rebuilt, Some(600.0));
    }

    #[tokio::test]
    async fn test_cached_routes_are_filtered_by_max_hops() {
        let clock = Arc::new(ManualClock::new(0.0));
        let (_gateway, finder) = finder(clock);
        assert_eq!(finder.find_routes(addr(1), addr(3), 3).await.unwrap().len(), 1);
        assert!(finder.find_routes(addr(1), addr(3), 1).await.unwrap().is_empty());
        assert_eq!(finder.cached_pairs(), 1);
    }

    #[tokio::test]
    async fn test_route_table_survives_restart_and_invalidate_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100.0));

        let (_g, first) = finder(clock.clone());
        let first = first.with_store(JsonCacheFile::in_dir(dir.path(), "routes.json"));
        first.find_routes(addr(1), addr(3), 3).await.unwrap();

        let (_g, second) = finder(clock.clone());
        let second = second.with_store(JsonCacheFile::in_dir(dir.path(), "routes.json"));
        clock.set(200.0);
        second.find_routes(addr(1), addr(3), 3).await.unwrap();
        let restored = second.table.load().get(&(addr(1), addr(3))).map(|e| e.built_at);
        assert_eq!(restored, Some(100.0));

        second.invalidate().await;
        assert_eq!(second.cached_pairs(), 0);
        assert!(!dir.path().join("routes.json").exists());
    }
}
