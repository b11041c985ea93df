//! Route simulation and best-route selection.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use super::{BestRoute, Hop, Route, RouteResult};
use crate::metrics;
use crate::quote_service::{best_quote, QuoteService};
use crate::route_finder::RouteFinder;
use crate::types::conversions::string_to_address;
use crate::types::{Amount, Token};

pub struct RouteSimulator {
    finder: Arc<RouteFinder>,
    quotes: Arc<QuoteService>,
    max_hops: usize,
    route_concurrency: usize,
}

impl RouteSimulator {
    /// `route_concurrency` of 0 falls back to the quote service's worker width.
    pub fn new(finder: Arc<RouteFinder>, quotes: Arc<QuoteService>, max_hops: usize, route_concurrency: usize) -> Self {
        let route_concurrency = if route_concurrency == 0 {
            quotes.config().max_workers.max(1)
        } else {
            route_concurrency
        };
        Self {
            finder,
            quotes,
            max_hops,
            route_concurrency,
        }
    }

    /// Prices `route` for `amount_in`, one hop after the other.
    ///
    /// Each hop is quoted with the previous hop's best output. Returns `None`
    /// as soon as one hop has no candidate; partial routes are never
    /// returned.
    pub async fn simulate_route(&self, route: &Route, amount_in: Amount) -> Option<RouteResult> {
        if route.hop_count() == 0 {
            return None;
        }
        let mut hops = Vec::with_capacity(route.hop_count());
        let mut amount = amount_in;
        for (token_in, token_out) in route.pairs() {
            let candidates = self.quotes.quote_hop(token_in, token_out, amount).await;
            let Some(best) = best_quote(&candidates) else {
                debug!("Route {} has no liquidity at {:?}->{:?}", route.get_id(), token_in, token_out);
                return None;
            };
            hops.push(Hop::from_quote(token_in, token_out, amount, best));
            amount = best.amount_out;
        }
        Some(RouteResult {
            path: route.path.clone(),
            hops,
            amount_in,
            amount_out: amount,
        })
    }

    /// Finds every candidate route, simulates each for `amount_in` and
    /// returns the one with the largest final output.
    ///
    /// `Ok(None)` means no route exists or none could be priced.
    ///
    /// # Errors
    ///
    /// Only when the pool graph cannot be built at all.
    pub async fn find_best_route(&self, token_in: Token, token_out: Token, amount_in: Amount) -> Result<Option<BestRoute>> {
        let span = tracing::info_span!("find_best_route", token_in = ?token_in, token_out = ?token_out, amount_in = %amount_in);
        self.find_best_route_inner(token_in, token_out, amount_in)
            .instrument(span)
            .await
    }

    /// [`find_best_route`](Self::find_best_route) for textual addresses.
    pub async fn find_best_route_str(&self, token_in: &str, token_out: &str, amount_in: Amount) -> Result<Option<BestRoute>> {
        let token_in = string_to_address(token_in).context("invalid token_in")?;
        let token_out = string_to_address(token_out).context("invalid token_out")?;
        self.find_best_route(token_in, token_out, amount_in).await
    }

    async fn find_best_route_inner(&self, token_in: Token, token_out: Token, amount_in: Amount) -> Result<Option<BestRoute>> {
        let started = Instant::now();
        let routes = self.finder.find_routes(token_in, token_out, self.max_hops).await?;
        if routes.is_empty() {
            info!("🔍 No candidate routes for {:?}->{:?}", token_in, token_out);
            metrics::record_route_search(started.elapsed(), 0, 0);
            return Ok(None);
        }
        debug!("Simulating {} routes for {:?}->{:?}", routes.len(), token_in, token_out);

        // ordered: ties on output keep the earliest route
        let simulated: Vec<Option<RouteResult>> = stream::iter(routes.iter())
            .map(|route| self.simulate_route(route, amount_in))
            .buffered(self.route_concurrency)
            .collect()
            .await;

        let failed = simulated.iter().filter(|r| r.is_none()).count();
        let all: Vec<RouteResult> = simulated.into_iter().flatten().collect();
        metrics::record_route_search(started.elapsed(), all.len(), failed);

        let best = all.iter().fold(None::<&RouteResult>, |best, result| match best {
            Some(current) if current.amount_out >= result.amount_out => Some(current),
            _ => Some(result),
        });
        let Some(best) = best.cloned() else {
            info!(
                "🔍 None of {} routes for {:?}->{:?} could be priced",
                routes.len(),
                token_in,
                token_out
            );
            return Ok(None);
        };

        info!(
            "✅ Best route {} ({} hops) out of {} priced: {} -> {}",
            Route::new(best.path.clone()).get_id(),
            best.hops.len(),
            all.len(),
            amount_in,
            best.amount_out
        );
        Ok(Some(BestRoute { best, all }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryGateway;
    use crate::gateway::PoolTokens;
    use crate::pool_graph_cache::PoolGraphCache;
    use crate::quote_service::QuoteConfig;
    use crate::route_finder::RouteFinderConfig;
    use crate::types::QuoteCandidate;
    use ethers::types::{Address, U256};
    use std::time::Duration;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn simulator(gateway: Arc<InMemoryGateway>) -> RouteSimulator {
        let graph = Arc::new(PoolGraphCache::new(gateway.clone(), Duration::from_secs(3600)));
        let finder = Arc::new(RouteFinder::new(graph, RouteFinderConfig::default()));
        let quotes = Arc::new(QuoteService::new(gateway, QuoteConfig::default()));
        RouteSimulator::new(finder, quotes, 3, 0)
    }

    /// Pool1 {A,B}, Pool2 {B,C}; A=1 B=2 C=3
    fn scenario() -> InMemoryGateway {
        InMemoryGateway::new()
            .with_pool(addr(100), PoolTokens::new(vec![addr(1), addr(2)]))
            .with_pool(addr(101), PoolTokens::new(vec![addr(2), addr(3)]))
            .with_quote(addr(1), addr(2), vec![QuoteCandidate::new(addr(100), U256::from(95))])
            .with_quote(addr(2), addr(3), vec![QuoteCandidate::new(addr(101), U256::from(90))])
    }

    #[tokio::test]
    async fn test_second_hop_is_quoted_with_first_hop_output() {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_quote_fn(addr(1), addr(2), |amount| vec![QuoteCandidate::new(addr(100), amount * 2)])
                .with_quote_fn(addr(2), addr(3), |amount| vec![QuoteCandidate::new(addr(101), amount + 1)]),
        );
        let sim = simulator(gateway.clone());
        let route = Route::new(vec![addr(1), addr(2), addr(3)]);

        let result = sim.simulate_route(&route, U256::from(10)).await.unwrap();
        assert_eq!(result.amount_out, U256::from(21));
        assert_eq!(result.hops[1].amount_in, U256::from(20));
        assert_eq!(
            gateway.quote_log(),
            vec![(addr(1), addr(2), U256::from(10)), (addr(2), addr(3), U256::from(20))]
        );
    }

    #[tokio::test]
    async fn test_route_with_dead_hop_fails_without_partial_result() {
        let gateway = Arc::new(
            InMemoryGateway::new().with_quote(addr(1), addr(2), vec![QuoteCandidate::new(addr(100), U256::from(5))]),
        );
        let sim = simulator(gateway.clone());
        let route = Route::new(vec![addr(1), addr(2), addr(3), addr(4)]);
        assert!(sim.simulate_route(&route, U256::from(10)).await.is_none());
        // the third hop is never requested
        assert_eq!(gateway.quote_log().len(), 2);
    }

    #[tokio::test]
    async fn test_end_to_end_best_route() {
        let sim = simulator(Arc::new(scenario()));
        let best = sim
            .find_best_route(addr(1), addr(3), U256::from(100))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(best.best.amount_out, U256::from(90));
        assert_eq!(best.best.path, vec![addr(1), addr(2), addr(3)]);
        let hops: Vec<_> = best
            .best
            .hops
            .iter()
            .map(|h| (h.token_in, h.token_out, h.amount_in, h.amount_out, h.pool))
            .collect();
        assert_eq!(
            hops,
            vec![
                (addr(1), addr(2), U256::from(100), U256::from(95), addr(100)),
                (addr(2), addr(3), U256::from(95), U256::from(90), addr(101)),
            ]
        );
        assert_eq!(best.all.len(), 1);
    }

    #[tokio::test]
    async fn test_disjoint_tokens_give_none() {
        let gateway = Arc::new(
            InMemoryGateway::new()
                .with_pool(addr(100), PoolTokens::new(vec![addr(1), addr(2)]))
                .with_pool(addr(101), PoolTokens::new(vec![addr(3), addr(4)])),
        );
        let sim = simulator(gateway);
        assert!(sim.find_best_route(addr(1), addr(4), U256::from(100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_best_of_direct_and_two_hop() {
        let gateway = Arc::new(
            scenario()
                .with_pool(addr(102), PoolTokens::new(vec![addr(1), addr(3)]))
                .with_quote(addr(1), addr(3), vec![QuoteCandidate::new(addr(102), U256::from(80))]),
        );
        let sim = simulator(gateway);
        let best = sim
            .find_best_route(addr(1), addr(3), U256::from(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.all.len(), 2);
        assert_eq!(best.best.hops.len(), 2);
        assert_eq!(best.best.amount_out, U256::from(90));
    }

    #[tokio::test]
    async fn test_zero_amount_is_simulated() {
        let gateway = Arc::new(
            scenario().with_quote_fn(addr(1), addr(2), |amount| vec![QuoteCandidate::new(addr(100), amount)]),
        );
        let sim = simulator(gateway);
        let best = sim.find_best_route(addr(1), addr(3), U256::zero()).await.unwrap().unwrap();
        assert_eq!(best.best.amount_in, U256::zero());
        assert_eq!(best.best.hops[1].amount_in, U256::zero());
    }

    #[tokio::test]
    async fn test_textual_addresses_are_canonicalised() {
        let gateway = InMemoryGateway::new()
            .with_pool(addr(100), PoolTokens::new(vec![addr(1), addr(0xabc)]))
            .with_quote(addr(1), addr(0xabc), vec![QuoteCandidate::new(addr(100), U256::from(7))]);
        let sim = simulator(Arc::new(gateway));
        let token_in = format!("{:#x}", addr(1));
        let token_out = format!("0x{}", format!("{:x}", addr(0xabc)).to_uppercase());

        let best = sim.find_best_route_str(&token_in, &token_out, U256::from(100)).await.unwrap();
        assert_eq!(best.map(|b| b.best.amount_out), Some(U256::from(7)));
        assert!(sim.find_best_route_str("garbage", &token_out, U256::one()).await.is_err());
    }
}
