//! # Pool Graph Cache
//!
//! Owns the process-wide [`PoolGraph`] and is its only writer.
//!
//! - Reads return the current snapshot (`Arc<PoolGraph>`) without locking.
//! - When the snapshot is missing or older than the TTL, the first caller
//!   rebuilds it from the gateway while holding the rebuild lock; callers
//!   arriving meanwhile wait on the lock and pick up the fresh snapshot
//!   instead of starting a second rebuild.
//! - A rebuilt graph is persisted with its build time so that a restart
//!   inside the TTL window skips the rebuild.
//! - Every gateway call made by a rebuild is bounded: a pool whose lookup
//!   times out is skipped like any other failed pool, and an enumeration
//!   that times out fails the rebuild.

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::cache::{CacheEntry, Clock, JsonCacheFile, SystemClock};
use crate::error::GatewayError;
use crate::gateway::{PoolTokens, PricingGateway};
use crate::metrics;
use crate::pool_graph::{PersistedPoolGraph, PoolGraph, PoolGraphBuilder};
use crate::types::{PoolId, Token};

const CACHE_NAME: &str = "pool_graph";

pub struct PoolGraphCache {
    gateway: Arc<dyn PricingGateway>,
    store: Option<JsonCacheFile>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    enumeration_concurrency: usize,
    call_timeout: Duration,
    enumeration_timeout: Duration,
    current: ArcSwapOption<CacheEntry<Arc<PoolGraph>>>,
    rebuild_lock: Mutex<()>,
}

/// Outcome of one rebuild, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    pub enumerated: usize,
    pub indexed: usize,
    pub failed: usize,
}

impl PoolGraphCache {
    pub fn new(gateway: Arc<dyn PricingGateway>, ttl: Duration) -> Self {
        Self {
            gateway,
            store: None,
            clock: Arc::new(SystemClock),
            ttl,
            enumeration_concurrency: 8,
            call_timeout: Duration::from_secs(2),
            enumeration_timeout: Duration::from_secs(600),
            current: ArcSwapOption::empty(),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Persist generations to `store` and try to warm-start from it.
    pub fn with_store(mut self, store: JsonCacheFile) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_enumeration_concurrency(mut self, concurrency: usize) -> Self {
        self.enumeration_concurrency = concurrency.max(1);
        self
    }

    /// `call` bounds each pool lookup; `enumeration` bounds the whole pool
    /// listing, which may itself be many registry reads.
    pub fn with_timeouts(mut self, call: Duration, enumeration: Duration) -> Self {
        self.call_timeout = call;
        self.enumeration_timeout = enumeration;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a fresh graph, rebuilding transparently if needed.
    ///
    /// # Errors
    ///
    /// Only when no graph can be produced at all: the pool list could not be
    /// enumerated. Per-pool failures are skipped.
    pub async fn get(&self) -> Result<Arc<PoolGraph>> {
        if let Some(graph) = self.fresh_snapshot() {
            metrics::increment_cache_hit(CACHE_NAME);
            return Ok(graph);
        }

        let _guard = self.rebuild_lock.lock().await;
        // another caller may have finished a rebuild while we waited
        if let Some(graph) = self.fresh_snapshot() {
            metrics::increment_cache_hit(CACHE_NAME);
            return Ok(graph);
        }
        metrics::increment_cache_miss(CACHE_NAME);

        if let Some(entry) = self.load_persisted().await {
            let graph = Arc::clone(&entry.value);
            self.current.store(Some(Arc::new(entry)));
            return Ok(graph);
        }

        let (graph, _) = self.rebuild_locked().await?;
        Ok(graph)
    }

    /// Rebuilds from the gateway regardless of freshness.
    pub async fn refresh(&self) -> Result<RebuildStats> {
        let _guard = self.rebuild_lock.lock().await;
        let (_, stats) = self.rebuild_locked().await?;
        Ok(stats)
    }

    /// Secondary accessor: every pool holding `token`.
    pub async fn get_pools_for_token(&self, token: Token) -> Result<std::collections::HashSet<PoolId>> {
        Ok(self.get().await?.pools_for_token(&token))
    }

    /// Current snapshot, fresh or not, without triggering a rebuild.
    pub fn snapshot(&self) -> Option<Arc<PoolGraph>> {
        self.current.load_full().map(|entry| Arc::clone(&entry.value))
    }

    /// Build time of the current snapshot.
    pub fn built_at(&self) -> Option<f64> {
        self.current.load_full().map(|entry| entry.built_at)
    }

    fn fresh_snapshot(&self) -> Option<Arc<PoolGraph>> {
        let entry = self.current.load_full()?;
        entry
            .is_fresh(self.clock.now(), self.ttl)
            .then(|| Arc::clone(&entry.value))
    }

    async fn load_persisted(&self) -> Option<CacheEntry<Arc<PoolGraph>>> {
        let store = self.store.as_ref()?;
        let persisted: PersistedPoolGraph = store.load_or_discard().await?;
        let entry = CacheEntry::new((), persisted.timestamp);
        if !entry.is_fresh(self.clock.now(), self.ttl) {
            debug!(
                "Persisted pool graph is {:.0}s old (ttl {:?}), rebuilding",
                entry.age(self.clock.now()),
                self.ttl
            );
            return None;
        }
        match PoolGraph::from_persisted(&persisted) {
            Ok(graph) => {
                info!(
                    "📂 Loaded pool graph from {} ({} pools, {} tokens)",
                    store.path().display(),
                    graph.pool_count(),
                    graph.token_count()
                );
                metrics::set_cache_size(CACHE_NAME, graph.pool_count());
                Some(CacheEntry::new(Arc::new(graph), persisted.timestamp))
            }
            Err(e) => {
                warn!("⚠️ Persisted pool graph unusable ({}), discarding", e);
                store.remove().await;
                None
            }
        }
    }

    /// Must be called with `rebuild_lock` held.
    async fn rebuild_locked(&self) -> Result<(Arc<PoolGraph>, RebuildStats)> {
        let started = Instant::now();
        info!("🔍 Building pool graph from {} registry...", self.gateway.name());

        let pools = match tokio::time::timeout(self.enumeration_timeout, self.gateway.enumerate_pools()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.enumeration_timeout)),
        }
        .with_context(|| format!("failed to enumerate pools from {}", self.gateway.name()))?;
        info!("📊 Registry reports {} pools", pools.len());

        let gateway = &self.gateway;
        let call_timeout = self.call_timeout;
        let mut memberships = stream::iter(pools.iter().copied().map(|pool| async move {
            let result = match tokio::time::timeout(call_timeout, gateway.pool_tokens(pool)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(call_timeout)),
            };
            (pool, result)
        }))
        .buffered(self.enumeration_concurrency);

        let mut builder = PoolGraphBuilder::new();
        let mut failed = 0usize;
        let mut processed = 0usize;
        while let Some((pool, result)) = memberships.next().await {
            processed += 1;
            match result {
                Ok(tokens) => {
                    if !builder.add_pool(pool, &tokens) {
                        debug!("Pool {:?} holds fewer than 2 tokens, skipping", pool);
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!("⚠️ Failed to read tokens of pool {:?}: {}", pool, e);
                }
            }
            if processed % 100 == 0 {
                debug!("Processed {}/{} pools", processed, pools.len());
            }
        }

        let graph = Arc::new(builder.build());
        let built_at = self.clock.now();
        let stats = RebuildStats {
            enumerated: pools.len(),
            indexed: graph.pool_count(),
            failed,
        };
        self.current
            .store(Some(Arc::new(CacheEntry::new(Arc::clone(&graph), built_at))));

        let elapsed = started.elapsed();
        metrics::record_pool_graph_rebuild(elapsed, failed);
        metrics::set_cache_size(CACHE_NAME, graph.pool_count());
        info!(
            "✅ Pool graph built in {:?}: {} tokens across {} pools ({} pools failed)",
            elapsed,
            graph.token_count(),
            graph.pool_count(),
            failed
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.store(&graph.to_persisted(built_at)).await {
                warn!("⚠️ Could not persist pool graph: {}", e);
            }
        }
        Ok((graph, stats))
    }
}

/// Builds a graph directly from `(pool, tokens)` pairs, bypassing the gateway.
pub fn graph_from_memberships<I>(memberships: I) -> PoolGraph
where
    I: IntoIterator<Item = (PoolId, PoolTokens)>,
{
    let mut builder = PoolGraphBuilder::new();
    for (pool, tokens) in memberships {
        builder.add_pool(pool, &tokens);
    }
    builder.build()
}
