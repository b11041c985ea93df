//! # Liquidity Router
//!
//! Multi-hop route finding and quoting over a registry of liquidity pools.
//!
//! ## Overview
//!
//! Given an input token, an output token and an amount, the router finds the
//! path of up to three swaps that yields the most output. It is organised in
//! four layers, each consuming the one below:
//!
//! - **Pool Graph Cache**: pool↔token membership, rebuilt from the gateway
//!   when its TTL runs out and persisted between runs.
//! - **Route Finder**: candidate token paths from the graph, cached per
//!   token pair with its own TTL.
//! - **Quote Service**: hop quotes with retries, timeouts and a bounded
//!   parallel batch.
//! - **Route Simulator**: prices every candidate path hop by hop and picks
//!   the best one.
//!
//! Everything remote goes through the [`gateway::PricingGateway`] trait.
//! [`adapters::CurveGateway`] talks to Curve's on-chain registry and rate
//! provider; [`adapters::InMemoryGateway`] serves fixed data.
//!
//! ## Example
//!
//! ```rust,no_run
//! use liquidity_router::Router;
//! use liquidity_router::adapters::CurveGateway;
//! use liquidity_router::settings::Settings;
//! use ethers::types::U256;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let gateway = Arc::new(CurveGateway::connect(&settings.gateway).await?);
//! let router = Router::from_settings(gateway, &settings);
//!
//! match router
//!     .find_best_route_str(
//!         "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
//!         "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9",
//!         U256::from(1_000_000u64),
//!     )
//!     .await?
//! {
//!     Some(best) => println!("{} -> {}", best.best.amount_in, best.best.amount_out),
//!     None => println!("no route"),
//! }
//! # Ok(())
//! # }
//! ```

// Core Types
/// Identifiers, amounts and quote payloads
pub mod types;
/// Typed gateway and cache failures
pub mod error;
/// Remote pricing interface
pub mod gateway;

// Gateways
/// Curve registry gateway and in-memory gateway
pub mod adapters;
/// Smart contract ABIs (read-only)
pub mod contracts;

// Caches
/// TTL bookkeeping, clocks and JSON persistence
pub mod cache;
/// Arena pool↔token graph
pub mod pool_graph;
/// TTL-cached, persisted pool graph
pub mod pool_graph_cache;

// Routing
/// Candidate path enumeration and route cache
pub mod route_finder;
/// Hop quotes with retry, timeout and bounded fan-out
pub mod quote_service;
/// Routes, simulation and best-route selection
pub mod router;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

use std::sync::Arc;

pub use gateway::PricingGateway;
pub use pool_graph::PoolGraph;
pub use pool_graph_cache::PoolGraphCache;
pub use quote_service::{best_quote, HopQuote, QuoteService};
pub use route_finder::{IntermediateStrategy, RouteFinder};
pub use router::{BestRoute, Hop, Route, RouteResult, RouteSimulator};
pub use settings::Settings;

use cache::JsonCacheFile;
use quote_service::QuoteConfig;
use route_finder::RouteFinderConfig;

/// The four layers wired together over one gateway.
pub struct Router {
    pub graph: Arc<PoolGraphCache>,
    pub finder: Arc<RouteFinder>,
    pub quotes: Arc<QuoteService>,
    pub simulator: RouteSimulator,
}

impl Router {
    /// Builds every layer from `settings`, with both caches persisted under
    /// `settings.cache.dir`.
    pub fn from_settings(gateway: Arc<dyn PricingGateway>, settings: &Settings) -> Self {
        let graph = Arc::new(
            PoolGraphCache::new(Arc::clone(&gateway), settings.cache.pool_graph_ttl())
                .with_store(JsonCacheFile::in_dir(&settings.cache.dir, &settings.cache.pool_graph_file))
                .with_enumeration_concurrency(settings.gateway.enumeration_concurrency)
                .with_timeouts(settings.gateway.call_timeout(), settings.gateway.enumeration_timeout()),
        );
        let finder = Arc::new(
            RouteFinder::new(
                Arc::clone(&graph),
                RouteFinderConfig {
                    ttl: settings.cache.route_ttl(),
                    strategy: settings.routing.intermediate_strategy,
                    max_three_hop_candidates: settings.routing.max_three_hop_candidates,
                },
            )
            .with_store(JsonCacheFile::in_dir(&settings.cache.dir, &settings.cache.route_file)),
        );
        let quotes = Arc::new(QuoteService::new(gateway, QuoteConfig::from(&settings.quoting)));
        let simulator = RouteSimulator::new(
            Arc::clone(&finder),
            Arc::clone(&quotes),
            settings.routing.max_hops,
            settings.routing.route_concurrency,
        );
        Self {
            graph,
            finder,
            quotes,
            simulator,
        }
    }

    pub async fn find_best_route(
        &self,
        token_in: types::Token,
        token_out: types::Token,
        amount_in: types::Amount,
    ) -> anyhow::Result<Option<BestRoute>> {
        self.simulator.find_best_route(token_in, token_out, amount_in).await
    }

    pub async fn find_best_route_str(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: types::Amount,
    ) -> anyhow::Result<Option<BestRoute>> {
        self.simulator.find_best_route_str(token_in, token_out, amount_in).await
    }

    /// Rebuilds the pool graph now and drops every cached route.
    pub async fn refresh(&self) -> anyhow::Result<pool_graph_cache::RebuildStats> {
        let stats = self.graph.refresh().await?;
        self.finder.invalidate().await;
        Ok(stats)
    }
}
